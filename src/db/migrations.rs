// Database migrations

use rusqlite::{Connection, Result};

pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table to track version
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_current_version(conn)?;

    if current_version < 1 {
        migration_001_privacy_tables(conn)?;
        set_version(conn, 1)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut stmt = conn.prepare("SELECT MAX(version) FROM schema_migrations")?;
    let version: Option<i32> = stmt.query_row([], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn set_version(conn: &Connection, version: i32) -> Result<()> {
    // INSERT OR REPLACE handles a previous partially-completed migration attempt
    conn.execute(
        "INSERT OR REPLACE INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

fn migration_001_privacy_tables(conn: &Connection) -> Result<()> {
    // Token map: one row per PII value, append-only.
    // The UNIQUE constraints are the correctness boundary for concurrent
    // first-time tokenization; any in-process cache is advisory only.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS token_maps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            token_type TEXT NOT NULL,
            original_value TEXT NOT NULL,
            normalized_value TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            metadata_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (token_type, normalized_value)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_token_maps_type ON token_maps(token_type)",
        [],
    )?;

    // Singleton: the installation-wide random date offset. Immutable once
    // created; regenerating it would invalidate every shifted date already
    // stored or shown.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS date_shifts (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            shift_days INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Privacy settings singleton, stored as a JSON blob under a fixed key
    conn.execute(
        "CREATE TABLE IF NOT EXISTS privacy_settings (
            id TEXT PRIMARY KEY,
            settings_json TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_token_uniqueness_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO token_maps (token_type, original_value, normalized_value, token)
             VALUES ('merchant', 'Whole Foods', 'WHOLE FOODS', 'MERCHANT_0001')",
            [],
        )
        .unwrap();

        // Same normalized value within a type is rejected
        let dup = conn.execute(
            "INSERT INTO token_maps (token_type, original_value, normalized_value, token)
             VALUES ('merchant', 'WHOLE FOODS', 'WHOLE FOODS', 'MERCHANT_0002')",
            [],
        );
        assert!(dup.is_err());

        // Same token string is rejected even across types
        let dup = conn.execute(
            "INSERT INTO token_maps (token_type, original_value, normalized_value, token)
             VALUES ('account', 'Chase', 'CHASE', 'MERCHANT_0001')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_date_shift_singleton_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO date_shifts (id, shift_days) VALUES (1, 937)", [])
            .unwrap();
        let second = conn.execute("INSERT INTO date_shifts (id, shift_days) VALUES (2, 500)", []);
        assert!(second.is_err());
    }
}
