//! Static server for the built dashboard.
//!
//! Serves files out of the dist directory by extension-derived content
//! type, falls back to `index.html` for extensionless client-side
//! routes, answers 404 for missing files and 500 for any other read
//! error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tower_http::cors::CorsLayer;
use tracing::info;

/// Configuration for the dashboard server.
pub struct ServerConfig {
    pub port: u16,
    pub dist: PathBuf,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            dist: PathBuf::from("dist"),
            dev_mode: false,
        }
    }
}

/// Build the router: every path goes through the static handler.
pub fn build_router(dist: PathBuf) -> Router {
    Router::new()
        .fallback(static_handler)
        .with_state(Arc::new(dist))
}

/// Serve a dist file, or fall back to index.html for SPA routing.
async fn static_handler(State(dist): State<Arc<PathBuf>>, req: Request<Body>) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    // Extensionless paths are client-side routes; the app shell handles
    // them after it loads.
    let file = if path.is_empty() || Path::new(path).extension().is_none() {
        dist.join("index.html")
    } else {
        dist.join(path)
    };

    match tokio::fs::read(&file).await {
        Ok(content) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            Response::builder()
                .header(header::CONTENT_TYPE, mime.as_ref())
                .body(Body::from(content))
                .expect("static response builds")
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response(),
    }
}

/// Start the dashboard server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let mut app = build_router(config.dist.clone());
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(
        addr = %listener.local_addr()?,
        dist = %config.dist.display(),
        "dashboard server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn get(router: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, content_type, body)
    }

    fn dist_with_files() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(dir.path().join("app.css"), "body {}").unwrap();
        std::fs::write(dir.path().join("app.js"), "void 0").unwrap();
        std::fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        std::fs::write(dir.path().join("logo.bin"), [0u8, 1, 2]).unwrap();
        dir
    }

    #[tokio::test]
    async fn serves_files_with_extension_derived_content_types() {
        let dist = dist_with_files();
        for (uri, expected) in [
            ("/index.html", "text/html"),
            ("/app.css", "text/css"),
            ("/manifest.json", "application/json"),
            ("/logo.bin", "application/octet-stream"),
        ] {
            let (status, content_type, _) = get(build_router(dist.path().into()), uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert!(
                content_type.unwrap().starts_with(expected),
                "{} should be {}",
                uri,
                expected
            );
        }
        let (status, content_type, _) = get(build_router(dist.path().into()), "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().contains("javascript"));
    }

    #[tokio::test]
    async fn root_and_client_routes_fall_back_to_index() {
        let dist = dist_with_files();
        for uri in ["/", "/orders", "/flows/3/stages"] {
            let (status, _, body) = get(build_router(dist.path().into()), uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(body, b"<html>app</html>", "{}", uri);
        }
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dist = dist_with_files();
        let (status, _, body) = get(build_router(dist.path().into()), "/nope.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"File not found");
    }

    #[tokio::test]
    async fn unreadable_file_is_500() {
        let dist = dist_with_files();
        // A directory with a file-like name: reading it fails with
        // something other than NotFound.
        std::fs::create_dir(dist.path().join("broken.js")).unwrap();
        let (status, _, body) = get(build_router(dist.path().into()), "/broken.js").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Server error");
    }

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.dist, PathBuf::from("dist"));
        assert!(!config.dev_mode);
    }
}
