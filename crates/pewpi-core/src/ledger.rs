//! Append-only transfer ledger.
//!
//! Every balance movement leaves a record; redistribution decisions are
//! derived from these records (trailing-window activity counts), never from
//! separate bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferReason {
    Mint,
    Spend,
    Transfer,
    Redistribution,
}

impl TransferReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferReason::Mint => "mint",
            TransferReason::Spend => "spend",
            TransferReason::Transfer => "transfer",
            TransferReason::Redistribution => "redistribution",
        }
    }
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mint" => Ok(TransferReason::Mint),
            "spend" => Ok(TransferReason::Spend),
            "transfer" => Ok(TransferReason::Transfer),
            "redistribution" => Ok(TransferReason::Redistribution),
            other => Err(format!("unknown transfer reason: {other}")),
        }
    }
}

/// One ledger entry. `to_owner` is `None` for spends (tokens leave
/// circulation rather than moving to another owner).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub token_symbol: String,
    pub from_owner: String,
    #[serde(default)]
    pub to_owner: Option<String>,
    pub amount: u64,
    pub timestamp: u64,
    pub reason: TransferReason,
}

/// Count of transfers an owner participated in (either side) at or after
/// `since`.
pub fn transfers_by(transfers: &[Transfer], owner: &str, since: u64) -> usize {
    transfers
        .iter()
        .filter(|t| t.timestamp >= since)
        .filter(|t| t.from_owner == owner || t.to_owner.as_deref() == Some(owner))
        .count()
}

/// Most recent transfer timestamp for a symbol, if any.
pub fn last_activity(transfers: &[Transfer], symbol: &str) -> Option<u64> {
    transfers
        .iter()
        .filter(|t| t.token_symbol == symbol)
        .map(|t| t.timestamp)
        .max()
}

/// Owners with at least `min_transfers` ledger entries at or after `since`,
/// sorted for deterministic iteration. Mint entries count: minting is
/// activity.
pub fn active_traders(transfers: &[Transfer], since: u64, min_transfers: usize) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in transfers.iter().filter(|t| t.timestamp >= since) {
        *counts.entry(t.from_owner.as_str()).or_insert(0) += 1;
        if let Some(to) = t.to_owner.as_deref() {
            *counts.entry(to).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= min_transfers)
        .map(|(owner, _)| owner.to_string())
        .collect()
}
