//! Error types for reel-core

use thiserror::Error;

/// Result type alias using reel-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reel-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A reorder request was not a permutation of the current favorites
    #[error("Invalid reorder: {0}")]
    InvalidReorder(String),

    /// A drag index outside the favorites collection
    #[error("Index {index} is out of bounds for {len} favorites")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A drop or cancel arrived while no drag was in progress
    #[error("No drag gesture is in progress")]
    NotDragging,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid runtime configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Session persistence or validation error
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),

    /// Identity assertion could not be decoded
    #[error(transparent)]
    Assertion(#[from] crate::identity::AssertionError),

    /// Favorites service error
    #[error(transparent)]
    Service(#[from] crate::service::ServiceError),
}
