//! Typed error hierarchy for the shopfloor client.
//!
//! Four top-level enums cover the four subsystems:
//! - `ApiError` — transport, authorization, and response failures
//! - `CacheError` — cache read/decode failures
//! - `BridgeError` — push-channel connection failures
//! - `StorageError` — credential persistence failures

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors surfaced by the HTTP layer.
///
/// The interceptor handles 401 internally; `Unauthorized` only escapes
/// after the refresh exchange itself has failed, at which point stored
/// credentials have already been cleared.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session expired, log in again")]
    Unauthorized,

    #[error("Validation failed for {} field(s)", .fields.len())]
    Validation { fields: BTreeMap<String, Vec<String>> },

    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error (status {status})")]
    Server { status: u16, body: String },

    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    /// Whether retrying the same request could possibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }

    /// Field-level messages for form display, if this is a validation error.
    pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::Validation { fields } => Some(fields),
            _ => None,
        }
    }
}

/// Errors from reading typed data out of the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache entry {key} holds no data")]
    Empty { key: String },

    #[error("Failed to decode cached value for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the live-update push channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("No access credential available for the push channel")]
    MissingCredential,

    #[error("Push connection failed: {0}")]
    Connect(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Unparseable push payload: {0}")]
    Payload(#[source] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connect(Box::new(err))
    }
}

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access credential file at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt credential file at {path}: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No user configuration directory available")]
    NoConfigDir,
}
