//! Authenticated HTTP client with transparent credential refresh.
//!
//! Every request goes out with the current access token attached. A 401
//! answer triggers exactly one refresh-token exchange and one replay of
//! the original request; a failed exchange is terminal — stored
//! credentials are cleared and the application is signalled logged out.
//! Concurrent 401s share a single exchange: the refresh path is guarded
//! by a lock, and late arrivals reuse the token the first caller stored.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::QueryParams;
use crate::errors::ApiError;
use crate::storage::CredentialStore;

/// HTTP method of an endpoint, const-constructible for the endpoint
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Whether the client currently holds usable credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// One outgoing request, rebuildable so the interceptor can replay it
/// after a refresh.
#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub method: HttpMethod,
    pub path: String,
    pub query: Option<QueryParams>,
    pub body: Option<Value>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    store: Arc<CredentialStore>,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    auth_tx: watch::Sender<AuthState>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        store: Arc<CredentialStore>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let initial = if store.token_pair().is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        };
        let (auth_tx, _) = watch::channel(initial);
        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            store,
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            auth_tx,
        })
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Watch login/logout transitions; the bridge and the CLI both hang
    /// off this.
    pub fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.auth_tx.subscribe()
    }

    pub(crate) fn set_auth_state(&self, state: AuthState) {
        self.auth_tx.send_replace(state);
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ── Request pipeline ──────────────────────────────────────────────

    /// Send a request through the refresh interceptor and decode the
    /// JSON body (`Value::Null` for empty 2xx responses).
    pub(crate) async fn execute(&self, spec: RequestSpec) -> Result<Value, ApiError> {
        let access = self.store.token_pair().map(|p| p.access);
        let response = self.issue(&spec, access.as_deref()).await?;

        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Self::digest(response).await;
        }

        debug!(path = %spec.path, "unauthorized, attempting refresh");
        let fresh = self.refresh_access(access.as_deref()).await?;
        // Replay exactly once; a second 401 propagates as-is.
        let response = self.issue(&spec, Some(&fresh)).await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        Self::digest(response).await
    }

    async fn issue(
        &self,
        spec: &RequestSpec,
        access: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .http
            .request(spec.method.to_reqwest(), self.url(&spec.path));
        if let Some(params) = &spec.query
            && !params.is_empty()
        {
            request = request.query(&params.as_pairs());
        }
        if let Some(token) = access {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Map the response onto the error taxonomy: 2xx decodes, 4xx with a
    /// field map becomes a validation error for the originating form,
    /// other 4xx a rejection, 5xx a server error.
    async fn digest(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(ApiError::Decode);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                body,
            });
        }

        // Field-level payloads look like {"field": ["msg", ...]}.
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
            let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
            let mut message = None;
            for (name, value) in map {
                match value {
                    Value::Array(msgs) => {
                        fields.insert(
                            name,
                            msgs.into_iter()
                                .filter_map(|m| m.as_str().map(str::to_string))
                                .collect(),
                        );
                    }
                    Value::String(msg) if name == "detail" => message = Some(msg),
                    _ => {}
                }
            }
            if !fields.is_empty() {
                return Err(ApiError::Validation { fields });
            }
            if let Some(message) = message {
                return Err(ApiError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }
        }
        Err(ApiError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }

    // ── Credential refresh ────────────────────────────────────────────

    /// Obtain a fresh access token, sharing one exchange across
    /// concurrent callers. `seen` is the access token the caller just
    /// got a 401 with; if the stored token already differs, someone else
    /// refreshed while we waited for the lock and that token is reused.
    async fn refresh_access(&self, seen: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.store.token_pair();
        if let Some(pair) = &current
            && Some(pair.access.as_str()) != seen
        {
            return Ok(pair.access.clone());
        }
        let Some(pair) = current else {
            return Err(ApiError::Unauthorized);
        };

        let exchange = self
            .issue(
                &RequestSpec {
                    method: HttpMethod::Post,
                    path: "token/refresh/".to_string(),
                    query: None,
                    body: Some(serde_json::json!({ "refresh": pair.refresh })),
                },
                None,
            )
            .await?;

        if !exchange.status().is_success() {
            // Terminal: the session is over.
            warn!(status = %exchange.status(), "refresh exchange failed, logging out");
            let _ = self.store.clear_all();
            self.auth_tx.send_replace(AuthState::Anonymous);
            return Err(ApiError::Unauthorized);
        }

        let refreshed: crate::api::auth::RefreshResponse =
            exchange.json().await.map_err(ApiError::Transport)?;
        let access = refreshed.access;

        // Same scope the pair already lives in.
        self.store
            .update_access(&access)
            .map_err(|e| ApiError::Rejected {
                status: 0,
                message: format!("failed to persist refreshed token: {}", e),
            })?;
        debug!("access token refreshed");
        Ok(access)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
