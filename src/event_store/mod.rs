//! Event Store Module for the audit log
//!
//! This module provides the persistence layer:
//! - `EventStore`: Append, point lookups and the serialized write path
//! - `RegionCursor`: Paged range queries over regions, actors and windows
//! - Inventory snapshots and rollback markers
//! - Retention purge and statistics
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌──────────┐    ┌──────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ Recorder │───►│ append_batch │───►│ assign seq ids │───►│ block/cont./ │
//! │ worker   │    │ (one tx)     │    │ under mutex    │    │ inv. tables  │
//! └──────────┘    └──────────────┘    └────────────────┘    └──────────────┘
//!
//! Rollback Path:
//! ┌──────────────┐    ┌──────────────┐    ┌────────────────────┐
//! │ purge gate   │───►│ RegionCursor │───►│ commit_rollback()  │
//! │ (read side)  │    │ page by page │    │ marker + flags, tx │
//! └──────────────┘    └──────────────┘    └────────────────────┘
//! ```

mod cursor;
mod markers;
mod purge;
mod schema;
mod snapshot;
mod stats;
mod store;

pub use cursor::{EventFilter, RegionCursor};
pub use purge::{retention_cutoff, PurgeCounts};
pub use stats::EventStoreStats;
pub use store::EventStore;
