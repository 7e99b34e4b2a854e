use std::fmt;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Symbols are short uppercase tickers.
static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{1,12}$").expect("symbol regex is valid"));

/// A minted token.
///
/// `id` is unique within a ledger (enforced by the store as a primary key).
/// `created_at` is set once at mint time; every mutation bumps `updated_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub amount: u64,
    pub creator: String,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Fields supplied by the caller at mint time. Everything else (id,
/// timestamps) is assigned by [`Token::mint`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenDraft {
    pub name: String,
    pub symbol: String,
    pub amount: u64,
    pub creator: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Partial update: `None` fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenPatch {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub amount: Option<u64>,
    pub creator: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    EmptyName,
    InvalidSymbol(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::EmptyName => write!(f, "token name must not be empty"),
            TokenError::InvalidSymbol(s) => {
                write!(f, "invalid symbol '{s}': expected 1-12 chars of [A-Z0-9]")
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// Check a ticker symbol against the canonical shape.
pub fn validate_symbol(symbol: &str) -> Result<(), TokenError> {
    if SYMBOL_RE.is_match(symbol) {
        Ok(())
    } else {
        Err(TokenError::InvalidSymbol(symbol.to_string()))
    }
}

/// Generate a token id in the `tok_<unix-secs>_<random>` form.
pub fn new_token_id(now: u64, rng: &mut impl Rng) -> String {
    let suffix: u32 = rng.random_range(0..0x100_0000);
    format!("tok_{now}_{suffix:06x}")
}

impl Token {
    /// Mint a token from a draft: validates, assigns id and timestamps.
    pub fn mint(draft: TokenDraft, now: u64, rng: &mut impl Rng) -> Result<Self, TokenError> {
        if draft.name.trim().is_empty() {
            return Err(TokenError::EmptyName);
        }
        validate_symbol(&draft.symbol)?;

        Ok(Self {
            id: new_token_id(now, rng),
            name: draft.name,
            symbol: draft.symbol,
            amount: draft.amount,
            creator: draft.creator,
            created_at: now,
            updated_at: now,
            metadata: draft.metadata,
        })
    }

    /// Merge a patch. Preserves `id` and `created_at`, bumps `updated_at`.
    pub fn apply_patch(&mut self, patch: TokenPatch, now: u64) -> Result<(), TokenError> {
        if let Some(symbol) = &patch.symbol {
            validate_symbol(symbol)?;
        }
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(TokenError::EmptyName);
            }
            self.name = name;
        }
        if let Some(symbol) = patch.symbol {
            self.symbol = symbol;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(creator) = patch.creator {
            self.creator = creator;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn draft(name: &str, symbol: &str) -> TokenDraft {
        TokenDraft {
            name: name.to_string(),
            symbol: symbol.to_string(),
            amount: 100,
            creator: "u1".to_string(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_mint_assigns_id_and_timestamps() {
        let token = Token::mint(draft("Brain", "BRN"), 1_000, &mut rng()).unwrap();
        assert!(token.id.starts_with("tok_1000_"), "id: {}", token.id);
        assert_eq!(token.created_at, 1_000);
        assert_eq!(token.updated_at, 1_000);
        assert_eq!(token.amount, 100);
        assert_eq!(token.creator, "u1");
    }

    #[test]
    fn test_mint_rejects_empty_name() {
        let result = Token::mint(draft("   ", "BRN"), 0, &mut rng());
        assert_eq!(result.unwrap_err(), TokenError::EmptyName);
    }

    #[test]
    fn test_mint_rejects_bad_symbol() {
        for bad in ["", "brn", "TOOLONGSYMBOL", "B RN", "BRN!"] {
            let result = Token::mint(draft("Brain", bad), 0, &mut rng());
            assert!(
                matches!(result, Err(TokenError::InvalidSymbol(_))),
                "symbol '{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_symbol_accepts_digits() {
        assert!(validate_symbol("WEB3").is_ok());
        assert!(validate_symbol("X").is_ok());
    }

    #[test]
    fn test_ids_differ_within_a_second() {
        let mut rng = rng();
        let a = new_token_id(1_000, &mut rng);
        let b = new_token_id(1_000, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_patch_preserves_identity() {
        let mut token = Token::mint(draft("Brain", "BRN"), 1_000, &mut rng()).unwrap();
        let id = token.id.clone();

        let patch = TokenPatch {
            amount: Some(42),
            ..TokenPatch::default()
        };
        token.apply_patch(patch, 2_000).unwrap();

        assert_eq!(token.id, id);
        assert_eq!(token.created_at, 1_000);
        assert_eq!(token.updated_at, 2_000);
        assert_eq!(token.amount, 42);
        assert_eq!(token.name, "Brain");
    }

    #[test]
    fn test_patch_rejects_invalid_symbol_without_mutating() {
        let mut token = Token::mint(draft("Brain", "BRN"), 1_000, &mut rng()).unwrap();
        let patch = TokenPatch {
            name: Some("Renamed".to_string()),
            symbol: Some("bad".to_string()),
            ..TokenPatch::default()
        };
        assert!(token.apply_patch(patch, 2_000).is_err());
        assert_eq!(token.name, "Brain");
        assert_eq!(token.updated_at, 1_000);
    }

    #[test]
    fn test_metadata_roundtrips_serde() {
        let mut meta = Map::new();
        meta.insert("origin".to_string(), Value::String("genesis".to_string()));
        let mut d = draft("Brain", "BRN");
        d.metadata = meta;

        let token = Token::mint(d, 0, &mut rng()).unwrap();
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}
