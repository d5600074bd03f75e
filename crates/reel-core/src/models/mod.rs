//! Data models for Reel

mod favorites;
mod identity;
mod movie;

pub use favorites::Favorites;
pub use identity::Identity;
pub use movie::MovieId;
