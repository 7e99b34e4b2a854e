use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A user session and its balances, keyed by ticker symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: u64,
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WalletError {
    InsufficientBalance {
        symbol: String,
        have: u64,
        want: u64,
    },
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::InsufficientBalance { symbol, have, want } => {
                write!(f, "insufficient {symbol} balance: have {have}, want {want}")
            }
        }
    }
}

impl std::error::Error for WalletError {}

impl Session {
    pub fn new(user_id: &str, username: &str, created_at: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            email: None,
            avatar_url: None,
            created_at,
            balances: BTreeMap::new(),
        }
    }

    /// Balance for a symbol; unknown symbols read as zero.
    pub fn balance(&self, symbol: &str) -> u64 {
        self.balances.get(symbol).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, symbol: &str, amount: u64) -> u64 {
        let entry = self.balances.entry(symbol.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
        *entry
    }

    /// Debit a balance. On insufficient funds the balance is left untouched.
    /// Returns the remaining balance.
    pub fn spend(&mut self, symbol: &str, amount: u64) -> Result<u64, WalletError> {
        let have = self.balance(symbol);
        if have < amount {
            return Err(WalletError::InsufficientBalance {
                symbol: symbol.to_string(),
                have,
                want: amount,
            });
        }
        let remaining = have - amount;
        if remaining == 0 {
            self.balances.remove(symbol);
        } else {
            self.balances.insert(symbol.to_string(), remaining);
        }
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_symbol_reads_zero() {
        let session = Session::new("u1", "alice", 0);
        assert_eq!(session.balance("BRN"), 0);
    }

    #[test]
    fn test_credit_accumulates() {
        let mut session = Session::new("u1", "alice", 0);
        assert_eq!(session.credit("BRN", 10), 10);
        assert_eq!(session.credit("BRN", 5), 15);
        assert_eq!(session.balance("BRN"), 15);
    }

    #[test]
    fn test_spend_scenario() {
        // create {symbol: X, amount: 100, creator: u1} → spend 40 → spend 70
        let mut session = Session::new("u1", "alice", 0);
        session.credit("X", 100);
        assert_eq!(session.balance("X"), 100);

        assert_eq!(session.spend("X", 40).unwrap(), 60);
        assert_eq!(session.balance("X"), 60);

        let err = session.spend("X", 70).unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientBalance {
                symbol: "X".to_string(),
                have: 60,
                want: 70,
            }
        );
        assert_eq!(session.balance("X"), 60, "failed spend must not mutate");
    }

    #[test]
    fn test_spend_to_zero_removes_entry() {
        let mut session = Session::new("u1", "alice", 0);
        session.credit("X", 10);
        assert_eq!(session.spend("X", 10).unwrap(), 0);
        assert!(!session.balances.contains_key("X"));
    }

    #[test]
    fn test_credit_saturates() {
        let mut session = Session::new("u1", "alice", 0);
        session.credit("X", u64::MAX);
        assert_eq!(session.credit("X", 1), u64::MAX);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut session = Session::new("u1", "alice", 1_000);
        session.email = Some("alice@example.com".to_string());
        session.credit("BRN", 7);

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
