//! Database migrations

use rusqlite::Connection;

use super::DbResult;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> DbResult<()> {
    let version = get_version(conn)?;
    if version >= CURRENT_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    tracing::info!("Database schema is at version {CURRENT_VERSION}");
    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> DbResult<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: favorites documents
fn migrate_v1(conn: &Connection) -> DbResult<()> {
    apply(
        conn,
        1,
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS favorites (
            subject_id TEXT PRIMARY KEY,
            movie_ids TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )
}

/// Migration to version 2: push sequence for stale-write refusal
fn migrate_v2(conn: &Connection) -> DbResult<()> {
    apply(
        conn,
        2,
        "ALTER TABLE favorites ADD COLUMN sequence INTEGER;
        CREATE INDEX IF NOT EXISTS idx_favorites_updated ON favorites(updated_at DESC);
        INSERT INTO schema_version (version) VALUES (2);",
    )
}

/// Migration to version 3: sequences are scoped to the writer that issued them
fn migrate_v3(conn: &Connection) -> DbResult<()> {
    apply(
        conn,
        3,
        "ALTER TABLE favorites ADD COLUMN writer TEXT;
        INSERT INTO schema_version (version) VALUES (3);",
    )
}

fn apply(conn: &Connection, version: i32, statements: &str) -> DbResult<()> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    if let Err(error) = conn.execute_batch(statements) {
        conn.execute_batch("ROLLBACK").ok();
        return Err(error.into());
    }
    if let Err(error) = conn.execute_batch("COMMIT") {
        conn.execute_batch("ROLLBACK").ok();
        return Err(error.into());
    }

    tracing::info!("Migrated database to version {}", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v2_adds_sequence_column() {
        let conn = setup();
        run(&conn).unwrap();

        let has_sequence: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM pragma_table_info('favorites') WHERE name = 'sequence')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(has_sequence);
    }

    #[test]
    fn test_migration_from_v2_adds_writer_column() {
        let conn = setup();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute(
            "INSERT INTO favorites (subject_id, movie_ids, sequence, updated_at) VALUES ('user-1', '[\"m1\"]', 9, 0)",
            [],
        )
        .unwrap();
        assert_eq!(get_version(&conn).unwrap(), 2);

        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
        let (sequence, writer): (i64, Option<String>) = conn
            .query_row(
                "SELECT sequence, writer FROM favorites WHERE subject_id = 'user-1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(sequence, 9);
        assert_eq!(writer, None);
    }
}
