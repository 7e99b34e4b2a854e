use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use pewpi_core::{
    MagicLink, RedistributionPolicy, Session, Token, TokenDraft, TokenPatch, TokenQuery,
    TokenStatus, Transfer, TransferReason, WalletError, active_traders, last_activity,
};

use crate::error::{Result, StoreError};
use crate::events::{EventBus, StoreEvent};
use crate::schema;

/// One redistribution log entry, as recorded by [`Store::sweep`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Redistribution {
    pub token_id: String,
    pub token_symbol: String,
    pub from_owner: String,
    pub to_owner: String,
    pub timestamp: u64,
}

/// Outcome of a sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub redistributed: Vec<Redistribution>,
    pub warned: Vec<(String, u64)>,
}

/// Warning flags expire after this long, so a token that stays in the same
/// band keeps being re-warned daily instead of once ever.
const NOTICE_TTL_SECS: u64 = 86_400;

/// The repository behind every ledger. Each mutation runs in one SQLite
/// transaction and publishes on the bus after commit.
pub struct Store {
    conn: Connection,
    bus: EventBus,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn,
            bus: EventBus::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn,
            bus: EventBus::new(),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreEvent> {
        self.bus.subscribe()
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Tokens ---

    /// Mint and persist a token. Credits the creator's balance with the
    /// minted amount and appends a mint entry to the ledger, all in one
    /// transaction.
    pub fn create_token(
        &self,
        draft: TokenDraft,
        now: u64,
        rng: &mut impl rand::Rng,
    ) -> Result<Token> {
        let token = Token::mint(draft, now, rng)?;

        let tx = self.conn.unchecked_transaction()?;
        insert_token_on(&tx, &token)?;
        credit_on(&tx, &token.creator, &token.symbol, token.amount)?;
        record_transfer_on(
            &tx,
            &Transfer {
                token_symbol: token.symbol.clone(),
                from_owner: token.creator.clone(),
                to_owner: None,
                amount: token.amount,
                timestamp: now,
                reason: TransferReason::Mint,
            },
        )?;
        tx.commit()?;

        tracing::info!(id = %token.id, symbol = %token.symbol, "token created");
        self.bus.publish(StoreEvent::TokenCreated {
            id: token.id.clone(),
            symbol: token.symbol.clone(),
        });
        Ok(token)
    }

    pub fn get_token(&self, id: &str) -> Result<Option<Token>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, symbol, amount, creator, created_at, updated_at, metadata
             FROM tokens WHERE id = ?1",
        )?;
        let row = stmt
            .query_row([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .optional()?;

        row.map(raw_to_token).transpose()
    }

    pub fn list_tokens(&self) -> Result<Vec<Token>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, symbol, amount, creator, created_at, updated_at, metadata
             FROM tokens ORDER BY rowid",
        )?;
        let rows: Vec<_> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter().map(raw_to_token).collect()
    }

    /// `find` contract: load, exact-match filter, sort, paginate in memory.
    pub fn find_tokens(&self, query: &TokenQuery) -> Result<Vec<Token>> {
        Ok(query.apply(self.list_tokens()?))
    }

    /// Merge a patch into an existing token. Preserves id and created_at,
    /// bumps updated_at.
    pub fn update_token(&self, id: &str, patch: TokenPatch, now: u64) -> Result<Token> {
        let mut token = self
            .get_token(id)?
            .ok_or_else(|| StoreError::NotFound(format!("token {id}")))?;
        token.apply_patch(patch, now)?;

        self.conn.execute(
            "UPDATE tokens SET name = ?1, symbol = ?2, amount = ?3, creator = ?4,
                               updated_at = ?5, metadata = ?6
             WHERE id = ?7",
            params![
                token.name,
                token.symbol,
                token.amount as i64,
                token.creator,
                token.updated_at as i64,
                metadata_to_text(&token.metadata)?,
                token.id,
            ],
        )?;

        self.bus.publish(StoreEvent::TokenUpdated {
            id: token.id.clone(),
        });
        Ok(token)
    }

    pub fn delete_token(&self, id: &str) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM tokens WHERE id = ?1", [id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("token {id}")));
        }
        self.bus.publish(StoreEvent::TokenDeleted { id: id.to_string() });
        Ok(())
    }

    // --- Sessions and balances ---

    /// Write a session and its balances. Replaces any previous row set.
    pub fn upsert_session(&self, session: &Session) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO sessions (user_id, username, email, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.user_id,
                session.username,
                session.email,
                session.avatar_url,
                session.created_at as i64,
            ],
        )?;
        tx.execute(
            "DELETE FROM balances WHERE user_id = ?1",
            [&session.user_id],
        )?;
        for (symbol, amount) in &session.balances {
            tx.execute(
                "INSERT INTO balances (user_id, symbol, amount) VALUES (?1, ?2, ?3)",
                params![session.user_id, symbol, *amount as i64],
            )?;
        }
        tx.commit()?;

        self.bus.publish(StoreEvent::SessionChanged {
            user_id: session.user_id.clone(),
        });
        Ok(())
    }

    pub fn get_session(&self, user_id: &str) -> Result<Option<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, username, email, avatar_url, created_at
             FROM sessions WHERE user_id = ?1",
        )?;
        let row = stmt
            .query_row([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .optional()?;

        let Some((user_id, username, email, avatar_url, created_at)) = row else {
            return Ok(None);
        };

        let mut session = Session::new(&user_id, &username, created_at as u64);
        session.email = email;
        session.avatar_url = avatar_url;

        let mut stmt = self
            .conn
            .prepare("SELECT symbol, amount FROM balances WHERE user_id = ?1")?;
        let balances: Vec<(String, i64)> = stmt
            .query_map([&user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        for (symbol, amount) in balances {
            session.balances.insert(symbol, amount as u64);
        }

        Ok(Some(session))
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare("SELECT user_id FROM sessions ORDER BY rowid")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get_session(&id)? {
                out.push(session);
            }
        }
        Ok(out)
    }

    pub fn balance(&self, user_id: &str, symbol: &str) -> Result<u64> {
        balance_on(&self.conn, user_id, symbol)
    }

    /// Debit a balance. Fails with a typed insufficient-balance error and no
    /// mutation; the spend leaves a ledger entry with no recipient.
    pub fn spend(&self, user_id: &str, symbol: &str, amount: u64, now: u64) -> Result<u64> {
        let tx = self.conn.unchecked_transaction()?;
        let remaining = debit_on(&tx, user_id, symbol, amount)?;
        record_transfer_on(
            &tx,
            &Transfer {
                token_symbol: symbol.to_string(),
                from_owner: user_id.to_string(),
                to_owner: None,
                amount,
                timestamp: now,
                reason: TransferReason::Spend,
            },
        )?;
        tx.commit()?;

        self.bus.publish(StoreEvent::TransferRecorded {
            token_symbol: symbol.to_string(),
            amount,
        });
        Ok(remaining)
    }

    /// Move balance between owners and append the ledger entry, atomically.
    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        symbol: &str,
        amount: u64,
        now: u64,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        debit_on(&tx, from, symbol, amount)?;
        credit_on(&tx, to, symbol, amount)?;
        record_transfer_on(
            &tx,
            &Transfer {
                token_symbol: symbol.to_string(),
                from_owner: from.to_string(),
                to_owner: Some(to.to_string()),
                amount,
                timestamp: now,
                reason: TransferReason::Transfer,
            },
        )?;
        tx.commit()?;

        self.bus.publish(StoreEvent::TransferRecorded {
            token_symbol: symbol.to_string(),
            amount,
        });
        Ok(())
    }

    pub fn list_transfers(&self) -> Result<Vec<Transfer>> {
        let mut stmt = self.conn.prepare(
            "SELECT token_symbol, from_owner, to_owner, amount, timestamp, reason
             FROM transfers ORDER BY rowid",
        )?;
        let rows: Vec<(String, String, Option<String>, i64, i64, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(symbol, from, to, amount, ts, reason)| {
                Ok(Transfer {
                    token_symbol: symbol,
                    from_owner: from,
                    to_owner: to,
                    amount: amount as u64,
                    timestamp: ts as u64,
                    reason: reason
                        .parse::<TransferReason>()
                        .map_err(StoreError::InvalidData)?,
                })
            })
            .collect()
    }

    pub fn list_redistributions(&self) -> Result<Vec<Redistribution>> {
        let mut stmt = self.conn.prepare(
            "SELECT token_id, token_symbol, from_owner, to_owner, timestamp
             FROM redistributions ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Redistribution {
                    token_id: row.get(0)?,
                    token_symbol: row.get(1)?,
                    from_owner: row.get(2)?,
                    to_owner: row.get(3)?,
                    timestamp: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    // --- Redistribution sweep ---

    /// One pass of the inactivity policy over every token.
    ///
    /// Ownership changes, balance moves, the redistribution log, and warning
    /// flags land in a single transaction; events go out only after commit.
    pub fn sweep(
        &self,
        policy: &RedistributionPolicy,
        now: u64,
        rng: &mut impl rand::Rng,
    ) -> Result<SweepReport> {
        let tokens = self.list_tokens()?;
        let transfers = self.list_transfers()?;
        let census = active_traders(&transfers, policy.window_start(now), policy.min_trades);

        let mut report = SweepReport::default();
        let mut events = Vec::new();

        let tx = self.conn.unchecked_transaction()?;

        // Expired flags are purged first so a token still in the same band
        // warns again after the TTL.
        tx.execute(
            "DELETE FROM notices WHERE created_at <= ?1",
            [now.saturating_sub(NOTICE_TTL_SECS) as i64],
        )?;

        for token in &tokens {
            let last = last_activity(&transfers, &token.symbol).unwrap_or(token.created_at);
            match policy.status(last, now) {
                TokenStatus::Active => {}
                TokenStatus::WarnAt(days_left) => {
                    let level = policy.warn_level(days_left).unwrap_or(days_left);
                    let flag = format!("{}:warn-{}", token.id, level);
                    let inserted = tx.execute(
                        "INSERT OR IGNORE INTO notices (flag, created_at) VALUES (?1, ?2)",
                        params![flag, now as i64],
                    )?;
                    if inserted > 0 {
                        report.warned.push((token.id.clone(), days_left));
                        events.push(StoreEvent::TokenWarned {
                            id: token.id.clone(),
                            days_left,
                        });
                    }
                }
                TokenStatus::Redistributable => {
                    // The current owner never inherits their own idle token.
                    let candidates: Vec<String> = census
                        .iter()
                        .filter(|owner| **owner != token.creator)
                        .cloned()
                        .collect();
                    let recipient = policy.pick_recipient(&candidates, rng);

                    let moved = balance_on(&tx, &token.creator, &token.symbol)?
                        .min(token.amount);
                    if moved > 0 {
                        debit_on(&tx, &token.creator, &token.symbol, moved)?;
                        credit_on(&tx, &recipient, &token.symbol, moved)?;
                    }

                    tx.execute(
                        "UPDATE tokens SET creator = ?1, updated_at = ?2 WHERE id = ?3",
                        params![recipient, now as i64, token.id],
                    )?;
                    tx.execute(
                        "INSERT INTO redistributions (token_id, token_symbol, from_owner, to_owner, timestamp)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![token.id, token.symbol, token.creator, recipient, now as i64],
                    )?;
                    record_transfer_on(
                        &tx,
                        &Transfer {
                            token_symbol: token.symbol.clone(),
                            from_owner: token.creator.clone(),
                            to_owner: Some(recipient.clone()),
                            amount: token.amount,
                            timestamp: now,
                            reason: TransferReason::Redistribution,
                        },
                    )?;

                    report.redistributed.push(Redistribution {
                        token_id: token.id.clone(),
                        token_symbol: token.symbol.clone(),
                        from_owner: token.creator.clone(),
                        to_owner: recipient.clone(),
                        timestamp: now,
                    });
                    events.push(StoreEvent::TokenRedistributed {
                        id: token.id.clone(),
                        from_owner: token.creator.clone(),
                        to_owner: recipient,
                    });
                }
            }
        }

        tx.commit()?;

        tracing::info!(
            redistributed = report.redistributed.len(),
            warned = report.warned.len(),
            "sweep complete"
        );
        for event in events {
            self.bus.publish(event);
        }
        Ok(report)
    }

    // --- Magic links ---

    pub fn issue_link(&self, email: &str, now: u64, ttl_secs: u64) -> Result<MagicLink> {
        let link = MagicLink::issue(email, now, ttl_secs);
        self.conn.execute(
            "INSERT INTO magic_links (token, email, issued_at, expires_at, used)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                link.token,
                link.email,
                link.issued_at as i64,
                link.expires_at as i64,
            ],
        )?;
        self.bus.publish(StoreEvent::LinkIssued {
            email: email.to_string(),
        });
        Ok(link)
    }

    /// Redeem a link: single-use, expiry checked at verification time.
    /// Marking it used and the check happen in the same transaction.
    pub fn verify_link(&self, token: &str, now: u64) -> Result<MagicLink> {
        let tx = self.conn.unchecked_transaction()?;

        let row = tx
            .query_row(
                "SELECT token, email, issued_at, expires_at, used FROM magic_links WHERE token = ?1",
                [token],
                |row| {
                    Ok(MagicLink {
                        token: row.get(0)?,
                        email: row.get(1)?,
                        issued_at: row.get::<_, i64>(2)? as u64,
                        expires_at: row.get::<_, i64>(3)? as u64,
                        used: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?;

        let mut link =
            row.ok_or_else(|| StoreError::NotFound(format!("magic link {token}")))?;
        link.verify(now)?;

        tx.execute(
            "UPDATE magic_links SET used = 1 WHERE token = ?1 AND used = 0",
            [token],
        )?;
        tx.commit()?;

        link.used = true;
        self.bus.publish(StoreEvent::LinkVerified {
            email: link.email.clone(),
        });
        Ok(link)
    }

    pub fn list_links(&self) -> Result<Vec<MagicLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT token, email, issued_at, expires_at, used FROM magic_links ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MagicLink {
                    token: row.get(0)?,
                    email: row.get(1)?,
                    issued_at: row.get::<_, i64>(2)? as u64,
                    expires_at: row.get::<_, i64>(3)? as u64,
                    used: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Row helpers shared between plain calls and open transactions
// ---------------------------------------------------------------------------

fn raw_to_token(
    row: (String, String, String, i64, String, i64, i64, String),
) -> Result<Token> {
    let (id, name, symbol, amount, creator, created_at, updated_at, metadata) = row;
    Ok(Token {
        id,
        name,
        symbol,
        amount: amount as u64,
        creator,
        created_at: created_at as u64,
        updated_at: updated_at as u64,
        metadata: text_to_metadata(&metadata)?,
    })
}

fn metadata_to_text(metadata: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(metadata)
        .map_err(|e| StoreError::InvalidData(format!("metadata serialization: {e}")))
}

fn text_to_metadata(text: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(text)
        .map_err(|e| StoreError::InvalidData(format!("metadata parse: {e}")))
}

fn insert_token_on(conn: &Connection, token: &Token) -> Result<()> {
    conn.execute(
        "INSERT INTO tokens (id, name, symbol, amount, creator, created_at, updated_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            token.id,
            token.name,
            token.symbol,
            token.amount as i64,
            token.creator,
            token.created_at as i64,
            token.updated_at as i64,
            metadata_to_text(&token.metadata)?,
        ],
    )?;
    Ok(())
}

fn balance_on(conn: &Connection, user_id: &str, symbol: &str) -> Result<u64> {
    let amount: Option<i64> = conn
        .query_row(
            "SELECT amount FROM balances WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |row| row.get(0),
        )
        .optional()?;
    Ok(amount.unwrap_or(0) as u64)
}

fn credit_on(conn: &Connection, user_id: &str, symbol: &str, amount: u64) -> Result<u64> {
    let new_amount = balance_on(conn, user_id, symbol)?.saturating_add(amount);
    conn.execute(
        "INSERT OR REPLACE INTO balances (user_id, symbol, amount) VALUES (?1, ?2, ?3)",
        params![user_id, symbol, new_amount as i64],
    )?;
    Ok(new_amount)
}

fn debit_on(conn: &Connection, user_id: &str, symbol: &str, amount: u64) -> Result<u64> {
    let have = balance_on(conn, user_id, symbol)?;
    if have < amount {
        return Err(StoreError::Wallet(WalletError::InsufficientBalance {
            symbol: symbol.to_string(),
            have,
            want: amount,
        }));
    }
    let remaining = have - amount;
    if remaining == 0 {
        conn.execute(
            "DELETE FROM balances WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
        )?;
    } else {
        conn.execute(
            "UPDATE balances SET amount = ?3 WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol, remaining as i64],
        )?;
    }
    Ok(remaining)
}

fn record_transfer_on(conn: &Connection, transfer: &Transfer) -> Result<()> {
    conn.execute(
        "INSERT INTO transfers (token_symbol, from_owner, to_owner, amount, timestamp, reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            transfer.token_symbol,
            transfer.from_owner,
            transfer.to_owner,
            transfer.amount as i64,
            transfer.timestamp as i64,
            transfer.reason.as_str(),
        ],
    )?;
    Ok(())
}
