//! reel-api - favorites service backend
//!
//! Stores one favorites document per subject in SQLite and refuses writes
//! older than the stored push sequence.

pub mod config;
pub mod db;
pub mod error;
pub mod rate_limit;
pub mod routes;

pub use config::AppConfig;
pub use routes::{app_router, AppState};
