//! Aviation message ingestion service.
//!
//! Loads the YAML configuration, assembles one directory poller per product
//! around a shared file processor and serves a small status API.

pub mod config_loader;
pub mod server;
pub mod service;

pub use config_loader::{load_config, parse_config, ServiceConfig};
pub use server::{build_router, start_server, ServerState};
pub use service::IngesterService;
