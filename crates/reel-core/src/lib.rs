//! reel-core - Core library for Reel
//!
//! This crate contains the session manager, the favorites store with its
//! reorder engine, and the sync scheduler that keeps favorites consistent
//! with the remote favorites service.

pub mod app;
pub mod config;
pub mod error;
pub mod favorites;
pub mod identity;
pub mod models;
pub mod service;
pub mod session;
pub mod state;
pub mod sync;
pub mod util;

pub use app::FavoritesApp;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use favorites::{FavoritesStore, ReorderEngine};
pub use models::{Favorites, Identity, MovieId};
pub use session::SessionManager;
pub use state::SyncState;
pub use sync::{Clock, LoginMergePolicy, SyncConfig, SyncScheduler};
