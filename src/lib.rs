pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod live;
pub mod models;
pub mod serve;
pub mod storage;

pub use client::SyncClient;
