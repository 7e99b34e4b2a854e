//! Versioned JSON export/import of a whole ledger.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pewpi_core::{MagicLink, Session, Token, Transfer, now_iso8601};

use crate::error::{Result, StoreError};
use crate::store::{Redistribution, Store};

pub const EXPORT_VERSION: &str = "1";

/// One balances-table row. Balances are exported from the table itself, not
/// through sessions: owners can hold balances without ever having a session.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub user_id: String,
    pub symbol: String,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerExport {
    pub version: String,
    pub exported_at: String,
    pub tokens: Vec<Token>,
    pub sessions: Vec<Session>,
    pub balances: Vec<BalanceRow>,
    pub transfers: Vec<Transfer>,
    pub redistributions: Vec<Redistribution>,
    pub magic_links: Vec<MagicLink>,
}

impl Store {
    fn all_balances(&self) -> Result<Vec<BalanceRow>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id, symbol, amount FROM balances ORDER BY user_id, symbol")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BalanceRow {
                    user_id: row.get(0)?,
                    symbol: row.get(1)?,
                    amount: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    pub fn export_json_string(&self) -> Result<String> {
        let export = LedgerExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: now_iso8601(),
            tokens: self.list_tokens()?,
            sessions: self.list_sessions()?,
            balances: self.all_balances()?,
            transfers: self.list_transfers()?,
            redistributions: self.list_redistributions()?,
            magic_links: self.list_links()?,
        };
        serde_json::to_string_pretty(&export)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }

    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Replace the entire ledger with the export's contents, atomically.
    pub fn import_json_str(&self, json: &str) -> Result<()> {
        let export: LedgerExport = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))?;
        if export.version != EXPORT_VERSION {
            return Err(StoreError::InvalidData(format!(
                "unsupported export version '{}'",
                export.version
            )));
        }

        let tx = self.conn().unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM tokens; DELETE FROM sessions; DELETE FROM balances;
             DELETE FROM transfers; DELETE FROM redistributions;
             DELETE FROM magic_links; DELETE FROM notices;",
        )?;

        for token in &export.tokens {
            tx.execute(
                "INSERT INTO tokens (id, name, symbol, amount, creator, created_at, updated_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    token.id,
                    token.name,
                    token.symbol,
                    token.amount as i64,
                    token.creator,
                    token.created_at as i64,
                    token.updated_at as i64,
                    serde_json::to_string(&token.metadata).map_err(|e| {
                        StoreError::InvalidData(format!("metadata serialization: {e}"))
                    })?,
                ],
            )?;
        }
        for session in &export.sessions {
            tx.execute(
                "INSERT INTO sessions (user_id, username, email, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    session.user_id,
                    session.username,
                    session.email,
                    session.avatar_url,
                    session.created_at as i64,
                ],
            )?;
        }
        for balance in &export.balances {
            tx.execute(
                "INSERT INTO balances (user_id, symbol, amount) VALUES (?1, ?2, ?3)",
                rusqlite::params![balance.user_id, balance.symbol, balance.amount as i64],
            )?;
        }
        for transfer in &export.transfers {
            tx.execute(
                "INSERT INTO transfers (token_symbol, from_owner, to_owner, amount, timestamp, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    transfer.token_symbol,
                    transfer.from_owner,
                    transfer.to_owner,
                    transfer.amount as i64,
                    transfer.timestamp as i64,
                    transfer.reason.as_str(),
                ],
            )?;
        }
        for r in &export.redistributions {
            tx.execute(
                "INSERT INTO redistributions (token_id, token_symbol, from_owner, to_owner, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    r.token_id,
                    r.token_symbol,
                    r.from_owner,
                    r.to_owner,
                    r.timestamp as i64,
                ],
            )?;
        }
        for link in &export.magic_links {
            tx.execute(
                "INSERT INTO magic_links (token, email, issued_at, expires_at, used)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    link.token,
                    link.email,
                    link.issued_at as i64,
                    link.expires_at as i64,
                    link.used as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn import_json_file(&self, path: &Path) -> Result<()> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pewpi_core::TokenDraft;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn populate(store: &Store) {
        let mut rng = rng();
        store
            .create_token(
                TokenDraft {
                    name: "Brain".to_string(),
                    symbol: "BRN".to_string(),
                    amount: 100,
                    creator: "u1".to_string(),
                    metadata: serde_json::Map::new(),
                },
                1_000,
                &mut rng,
            )
            .unwrap();
        store.transfer("u1", "u2", "BRN", 25, 2_000).unwrap();

        let mut session = Session::new("u1", "alice", 500);
        session.credit("BRN", 75);
        store.upsert_session(&session).unwrap();

        store.issue_link("alice@example.com", 2_500, 600).unwrap();
    }

    #[test]
    fn test_export_import_roundtrip() {
        let source = Store::open_in_memory().unwrap();
        populate(&source);

        let json = source.export_json_string().unwrap();
        let target = Store::open_in_memory().unwrap();
        target.import_json_str(&json).unwrap();

        assert_eq!(target.list_tokens().unwrap(), source.list_tokens().unwrap());
        assert_eq!(
            target.list_transfers().unwrap(),
            source.list_transfers().unwrap()
        );
        assert_eq!(
            target.list_sessions().unwrap(),
            source.list_sessions().unwrap()
        );
        assert_eq!(target.list_links().unwrap(), source.list_links().unwrap());
        assert_eq!(target.balance("u2", "BRN").unwrap(), 25);
    }

    #[test]
    fn test_import_replaces_existing() {
        let store = Store::open_in_memory().unwrap();
        populate(&store);

        let empty = Store::open_in_memory().unwrap();
        let json = empty.export_json_string().unwrap();

        store.import_json_str(&json).unwrap();
        assert!(store.list_tokens().unwrap().is_empty());
        assert!(store.list_transfers().unwrap().is_empty());
    }

    #[test]
    fn test_export_wire_format() {
        let store = Store::open_in_memory().unwrap();
        populate(&store);

        let json = store.export_json_string().unwrap();
        let wire: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(wire["version"], "1");
        assert!(wire["tokens"].is_array());
        assert!(wire["sessions"].is_array());
        assert!(wire["balances"].is_array());
        assert!(wire["transfers"].is_array());
        assert!(wire["redistributions"].is_array());
        assert!(wire["magic_links"].is_array());
    }

    #[test]
    fn test_import_rejects_unknown_version() {
        let store = Store::open_in_memory().unwrap();
        let json = r#"{
            "version": "99",
            "exported_at": "",
            "tokens": [], "sessions": [], "balances": [], "transfers": [],
            "redistributions": [], "magic_links": []
        }"#;
        assert!(matches!(
            store.import_json_str(json),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_import_invalid_json() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.import_json_str("not valid json").is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let source = Store::open_in_memory().unwrap();
        populate(&source);
        source.export_json_file(&path).unwrap();
        assert!(path.exists());

        let target = Store::open_in_memory().unwrap();
        target.import_json_file(&path).unwrap();
        assert_eq!(target.list_tokens().unwrap(), source.list_tokens().unwrap());
    }
}
