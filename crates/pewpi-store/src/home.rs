//! Ledger directory resolution and configuration.
//!
//! Layout:
//! ```text
//! ~/.pewpi/
//! ├── ledger.toml          (optional policy overrides)
//! └── ledgers/
//!     ├── default.db
//!     └── <name>.db
//! ```
//!
//! Each named ledger is one database file; the base directory comes from
//! `PEWPI_DATA_DIR` when set.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};

use pewpi_core::{DEFAULT_LINK_TTL_SECS, RedistributionPolicy};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Default base directory for all pewpi storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".pewpi")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn default_inactive_after_days() -> u64 {
    30
}

fn default_warn_at_days() -> Vec<u64> {
    vec![1, 3, 7]
}

fn default_min_trades() -> usize {
    2
}

fn default_activity_window_days() -> u64 {
    30
}

fn default_base_price() -> f64 {
    100.0
}

fn default_link_ttl_secs() -> u64 {
    DEFAULT_LINK_TTL_SECS
}

/// `ledger.toml`. Every field has a default, so an absent or partial file is
/// fine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_inactive_after_days")]
    pub inactive_after_days: u64,
    #[serde(default = "default_warn_at_days")]
    pub warn_at_days: Vec<u64>,
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
    #[serde(default = "default_activity_window_days")]
    pub activity_window_days: u64,
    /// Override the per-symbol feed seed; None derives it from the symbol.
    #[serde(default)]
    pub feed_seed: Option<u64>,
    #[serde(default = "default_base_price")]
    pub base_price: f64,
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            inactive_after_days: default_inactive_after_days(),
            warn_at_days: default_warn_at_days(),
            min_trades: default_min_trades(),
            activity_window_days: default_activity_window_days(),
            feed_seed: None,
            base_price: default_base_price(),
            link_ttl_secs: default_link_ttl_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| StoreError::InvalidData(format!("invalid config: {e}")))
    }

    pub fn policy(&self) -> RedistributionPolicy {
        RedistributionPolicy {
            inactive_after_days: self.inactive_after_days,
            warn_at_days: self.warn_at_days.clone(),
            min_trades: self.min_trades,
            activity_window_days: self.activity_window_days,
        }
    }
}

/// Sanitize a ledger name for use as a filename.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn resolve_ledger_id(name: Option<&str>) -> String {
    if let Some(name) = name {
        let sanitized = sanitize_name(name);
        if !sanitized.is_empty() {
            return sanitized;
        }
    }
    if let Ok(name) = env::var("PEWPI_LEDGER") {
        let sanitized = sanitize_name(&name);
        if !sanitized.is_empty() {
            return sanitized;
        }
    }
    "default".to_string()
}

/// A named ledger: its store plus the config that governs it.
pub struct LedgerHome {
    store: Store,
    config: LedgerConfig,
    ledger_id: String,
}

impl LedgerHome {
    /// Open a ledger, creating directories as needed.
    /// `name`: explicit ledger name (overrides `PEWPI_LEDGER`).
    /// `base_dir`: override the base directory (for testing).
    pub fn open(name: Option<&str>, base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(|| {
            env::var("PEWPI_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_base_dir())
        });
        let ledgers_dir = base.join("ledgers");
        fs::create_dir_all(&ledgers_dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", ledgers_dir.display()))
        })?;

        let config_path = base.join("ledger.toml");
        let config = if config_path.exists() {
            LedgerConfig::load(&config_path)?
        } else {
            LedgerConfig::default()
        };

        let ledger_id = resolve_ledger_id(name);
        let store = Store::open(&ledgers_dir.join(format!("{ledger_id}.db")))?;

        Ok(Self {
            store,
            config,
            ledger_id,
        })
    }

    /// Open with an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
            config: LedgerConfig::default(),
            ledger_id: "test".to_string(),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    pub fn policy(&self) -> RedistributionPolicy {
        self.config.policy()
    }
}
