//! pewpi token economy engine.
//!
//! Models a small token economy: minted tokens with per-user balances, an
//! append-only transfer ledger, an inactivity-based redistribution policy,
//! single-use magic links, and deterministic simulated market feeds.
//!
//! Zero I/O: pure domain logic with no opinions about transport or
//! persistence. The `pewpi-store` crate owns durability and eventing.

pub mod ledger;
pub mod magic_link;
pub mod market;
pub mod matchmaking;
pub mod query;
pub mod redistribution;
pub mod time;
pub mod token;
pub mod wallet;

pub use ledger::{Transfer, TransferReason, active_traders, last_activity, transfers_by};
pub use magic_link::{LinkError, MagicLink, DEFAULT_LINK_TTL_SECS};
pub use market::{MarketFeed, seed_for_symbol};
pub use matchmaking::{cosine_similarity, embed, rank_matches};
pub use query::{SortKey, SortOrder, TokenQuery};
pub use redistribution::{COMMUNITY_POOL, RedistributionPolicy, TokenStatus};
pub use time::{SECS_PER_DAY, now_iso8601, now_unix_secs, unix_to_iso8601};
pub use token::{Token, TokenDraft, TokenError, TokenPatch};
pub use wallet::{Session, WalletError};
