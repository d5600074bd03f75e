//! Favorites repository implementation

use chrono::Utc;
use reel_core::models::Favorites;
use rusqlite::{params, Connection, OptionalExtension};

use super::{DbError, DbResult};

/// Favorites of one subject as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFavorites {
    pub favorites: Favorites,
    /// Writer of the last sequenced write
    pub writer: Option<String>,
    /// Sequence of the last sequenced write
    pub sequence: Option<i64>,
    pub updated_at: i64,
}

/// Result of a replace request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied { sequence: Option<i64> },
    /// The stored write came from the same writer with a sequence at least as new
    Stale { stored: i64 },
}

/// Trait for favorites storage operations
pub trait FavoritesRepository {
    /// Get the favorites of a subject
    fn get(&self, subject_id: &str) -> DbResult<Option<StoredFavorites>>;

    /// Replace the favorites of a subject unless the write is stale.
    ///
    /// Sequences only order writes from the same writer; a write from another
    /// writer always applies.
    fn replace(
        &self,
        subject_id: &str,
        favorites: &Favorites,
        writer: Option<&str>,
        sequence: Option<i64>,
    ) -> DbResult<WriteOutcome>;
}

/// `SQLite` implementation of `FavoritesRepository`
pub struct SqliteFavoritesRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteFavoritesRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn stored_version(&self, subject_id: &str) -> DbResult<(Option<String>, Option<i64>)> {
        let version = self
            .conn
            .query_row(
                "SELECT writer, sequence FROM favorites WHERE subject_id = ?",
                params![subject_id],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;
        Ok(version.unwrap_or_default())
    }
}

impl FavoritesRepository for SqliteFavoritesRepository<'_> {
    fn get(&self, subject_id: &str) -> DbResult<Option<StoredFavorites>> {
        let row = self
            .conn
            .query_row(
                "SELECT movie_ids, writer, sequence, updated_at FROM favorites WHERE subject_id = ?",
                params![subject_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((movie_ids, writer, sequence, updated_at)) = row else {
            return Ok(None);
        };
        let favorites = serde_json::from_str::<Favorites>(&movie_ids)
            .map_err(|error| DbError::Corrupt(error.to_string()))?;
        Ok(Some(StoredFavorites {
            favorites,
            writer,
            sequence,
            updated_at,
        }))
    }

    fn replace(
        &self,
        subject_id: &str,
        favorites: &Favorites,
        writer: Option<&str>,
        sequence: Option<i64>,
    ) -> DbResult<WriteOutcome> {
        let movie_ids =
            serde_json::to_string(favorites).map_err(|error| DbError::Corrupt(error.to_string()))?;
        let tx = self.conn.unchecked_transaction()?;

        let (stored_writer, stored_sequence) = self.stored_version(subject_id)?;
        if let (Some(incoming), Some(stored)) = (sequence, stored_sequence) {
            if stored_writer.as_deref() == writer && incoming <= stored {
                return Ok(WriteOutcome::Stale { stored });
            }
        }

        // Unsequenced writes keep the stored version so later pushes still compare.
        let (next_writer, next_sequence) = match sequence {
            Some(sequence) => (writer.map(ToString::to_string), Some(sequence)),
            None => (stored_writer, stored_sequence),
        };
        tx.execute(
            "INSERT INTO favorites (subject_id, movie_ids, writer, sequence, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(subject_id) DO UPDATE SET
                movie_ids = excluded.movie_ids,
                writer = excluded.writer,
                sequence = excluded.sequence,
                updated_at = excluded.updated_at",
            params![
                subject_id,
                movie_ids,
                next_writer,
                next_sequence,
                Utc::now().timestamp_millis()
            ],
        )?;
        tx.commit()?;

        Ok(WriteOutcome::Applied {
            sequence: next_sequence,
        })
    }
}
