//! Client configuration, layered file → environment → CLI.
//!
//! Settings are read from `shopfloor.toml` (next to the working directory
//! or under the user config dir), then overridden by `SHOPFLOOR_*`
//! environment variables, then by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.com/"
//! timeout_ms = 15000
//!
//! [cache]
//! eviction_grace_secs = 60
//! debounce_ms = 500
//!
//! [serve]
//! port = 3000
//! dist = "dist"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "shopfloor.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopfloorConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub serve: ServeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the scheduling backend, with trailing slash.
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long an unsubscribed entry survives before eviction.
    pub eviction_grace_secs: u64,
    /// Quiet window for debounced inputs.
    pub debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction_grace_secs: 60,
            debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    pub port: u16,
    /// Directory holding the built dashboard.
    pub dist: PathBuf,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            dist: PathBuf::from("dist"),
        }
    }
}

impl ShopfloorConfig {
    /// Load configuration: defaults, then the config file (explicit path,
    /// working directory, or user config dir — first hit wins), then
    /// environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::find_file(explicit) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config at {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Invalid config at {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn find_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        let global = dirs::config_dir()?.join("shopfloor").join(CONFIG_FILE_NAME);
        global.exists().then_some(global)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SHOPFLOOR_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(port) = std::env::var("SHOPFLOOR_PORT")
            && let Ok(port) = port.parse()
        {
            self.serve.port = port;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    pub fn eviction_grace(&self) -> Duration {
        Duration::from_secs(self.cache.eviction_grace_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.cache.debounce_ms)
    }

    /// Push-channel URL for a resource stream, derived from the API base.
    /// `https://host/` becomes `wss://host/ws/{resource}/`.
    pub fn ws_url(&self, resource: &str) -> String {
        let base = self.api.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws/{}/", ws_base, resource)
    }
}
