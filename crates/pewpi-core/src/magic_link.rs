//! Single-use magic links.
//!
//! Dev-mode pseudo-authentication only: there is no server and no trust
//! boundary. Expiry is checked at verification time; single-use is enforced
//! by the store when it marks a link consumed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_LINK_TTL_SECS: u64 = 15 * 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MagicLink {
    pub token: String,
    pub email: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub used: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LinkError {
    Expired,
    AlreadyUsed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Expired => write!(f, "magic link expired"),
            LinkError::AlreadyUsed => write!(f, "magic link already used"),
        }
    }
}

impl std::error::Error for LinkError {}

impl MagicLink {
    pub fn issue(email: &str, now: u64, ttl_secs: u64) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            issued_at: now,
            expires_at: now + ttl_secs,
            used: false,
        }
    }

    /// Check whether this link is still redeemable at `now`.
    pub fn verify(&self, now: u64) -> Result<(), LinkError> {
        if self.used {
            return Err(LinkError::AlreadyUsed);
        }
        if now >= self.expires_at {
            return Err(LinkError::Expired);
        }
        Ok(())
    }
}
