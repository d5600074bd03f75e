//! SQLite storage for favorites documents

mod migrations;
mod repository;

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;

pub use repository::{
    FavoritesRepository, SqliteFavoritesRepository, StoredFavorites, WriteOutcome,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored favorites are corrupt: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database wrapper for a `SQLite` connection
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `path`, creating it if it doesn't exist.
    /// `:memory:` opens an in-memory database.
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            return Self::open_in_memory();
        }
        let database = Self {
            conn: Connection::open(path)?,
        };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let database = Self {
            conn: Connection::open_in_memory()?,
        };
        database.migrate()?;
        Ok(database)
    }

    fn configure(&self) -> DbResult<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn migrate(&self) -> DbResult<()> {
        migrations::run(&self.conn)
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
