//! Event Ingestion
//!
//! - `coordinator`: transform → validate → rate-limit → persist → rewards → broadcast
//! - `rewards`: reward integration port and the built-in points ledger

pub mod coordinator;
pub mod rewards;

pub use coordinator::{BroadcastStatus, EventCoordinator, IngestError, IngestReceipt};
pub use rewards::{PointsLedger, PointsTable, RewardHandler};
