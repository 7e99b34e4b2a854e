use std::fmt;

use pewpi_core::{LinkError, TokenError, WalletError};

/// Typed failure taxonomy. Callers can distinguish "not found" from
/// "insufficient balance" from backend failure without parsing messages.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
    NotFound(String),
    Token(TokenError),
    Wallet(WalletError),
    Link(LinkError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::Token(e) => write!(f, "{e}"),
            StoreError::Wallet(e) => write!(f, "{e}"),
            StoreError::Link(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<TokenError> for StoreError {
    fn from(e: TokenError) -> Self {
        StoreError::Token(e)
    }
}

impl From<WalletError> for StoreError {
    fn from(e: WalletError) -> Self {
        StoreError::Wallet(e)
    }
}

impl From<LinkError> for StoreError {
    fn from(e: LinkError) -> Self {
        StoreError::Link(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
