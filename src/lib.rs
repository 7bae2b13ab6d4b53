pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod redirect;
pub mod service;
pub mod shortener;
pub mod storage;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "snaplink=info,tower_http=info";
