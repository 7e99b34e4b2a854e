pub mod error;
pub mod events;
pub mod home;
pub mod json_bridge;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use events::{DEFAULT_CHANNEL_CAPACITY, EventBus, StoreEvent};
pub use home::{LedgerConfig, LedgerHome, default_base_dir};
pub use json_bridge::{BalanceRow, LedgerExport};
pub use store::{Redistribution, Store, SweepReport};
