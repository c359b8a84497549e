//! `shopfloor serve` — static dashboard server.

use std::path::PathBuf;

use anyhow::Result;

use shopfloor::config::ShopfloorConfig;
use shopfloor::serve::{ServerConfig, start_server};

pub async fn cmd_serve(
    config: &ShopfloorConfig,
    port: Option<u16>,
    dist: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let server = ServerConfig {
        port: port.unwrap_or(config.serve.port),
        dist: dist.unwrap_or_else(|| config.serve.dist.clone()),
        dev_mode: dev,
    };
    println!(
        "Serving {} at http://127.0.0.1:{}",
        server.dist.display(),
        server.port
    );
    start_server(server).await
}
