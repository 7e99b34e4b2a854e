use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

/// Create tables and indexes. Idempotent, safe to run on every open.
/// `schema_version` in `metadata` is the migration anchor for anything that
/// comes later.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tokens (
            id         TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            symbol     TEXT NOT NULL,
            amount     INTEGER NOT NULL,
            creator    TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            metadata   TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS sessions (
            user_id    TEXT PRIMARY KEY,
            username   TEXT NOT NULL,
            email      TEXT,
            avatar_url TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS balances (
            user_id TEXT NOT NULL,
            symbol  TEXT NOT NULL,
            amount  INTEGER NOT NULL,
            PRIMARY KEY (user_id, symbol)
        );

        CREATE TABLE IF NOT EXISTS transfers (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            token_symbol TEXT NOT NULL,
            from_owner   TEXT NOT NULL,
            to_owner     TEXT,
            amount       INTEGER NOT NULL,
            timestamp    INTEGER NOT NULL,
            reason       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS redistributions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            token_id     TEXT NOT NULL,
            token_symbol TEXT NOT NULL,
            from_owner   TEXT NOT NULL,
            to_owner     TEXT NOT NULL,
            timestamp    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS magic_links (
            token      TEXT PRIMARY KEY,
            email      TEXT NOT NULL,
            issued_at  INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            used       INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS notices (
            flag       TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tokens_symbol ON tokens(symbol);
        CREATE INDEX IF NOT EXISTS idx_tokens_creator ON tokens(creator);
        CREATE INDEX IF NOT EXISTS idx_transfers_symbol ON transfers(token_symbol);
        CREATE INDEX IF NOT EXISTS idx_transfers_timestamp ON transfers(timestamp);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for table in &[
            "metadata",
            "tokens",
            "sessions",
            "balances",
            "transfers",
            "redistributions",
            "magic_links",
            "notices",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert!(count >= 0, "table {table} should exist");
        }
    }

    #[test]
    fn test_schema_version_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_idempotent_initialize() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn test_busy_timeout_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn test_balances_composite_key() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        conn.execute(
            "INSERT INTO balances (user_id, symbol, amount) VALUES ('u1', 'BRN', 10)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO balances (user_id, symbol, amount) VALUES ('u1', 'BRN', 20)",
            [],
        );
        assert!(dup.is_err(), "duplicate (user, symbol) must be rejected");
    }

    #[test]
    fn test_token_id_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let insert = "INSERT INTO tokens (id, name, symbol, amount, creator, created_at, updated_at)
                      VALUES ('tok_1', 'Brain', 'BRN', 1, 'u1', 0, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err(), "id is a primary key");
    }
}
