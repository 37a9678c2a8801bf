//! worldlog - audit log and rollback engine for world mutations
//!
//! Records every block, container and inventory mutation of a host
//! simulation, answers "who changed what, where and when", and can roll a
//! region, an actor or a time window back (and forward again).
//!
//! # Features
//!
//! - **Non-blocking recording**: bounded queue, batched background writes
//! - **Indexed store**: SQLite tables per event category with point, actor
//!   and paged region queries
//! - **Rollback/restore**: per-target inverse computation, per-tick apply
//!   batches, cancellation, drift accounting
//! - **Inventory anchors**: periodic full snapshots for inventory rollback
//! - **Retention**: actor-agnostic purge by age
//!
//! # Modules
//!
//! - `types`: Core data structures (ChangeEvent, State, Scope, Window, ...)
//! - `event_store`: SQLite persistence, cursors, markers, purge
//! - `recorder`: Async batching front end used by mutation hooks
//! - `rollback` / `restore`: The undo and redo engines
//! - `world`: The `WorldPort` host interface and an in-memory world
//! - `inspect`: Per-actor selections and inspect mode
//! - `snapshots`: Periodic inventory snapshot capture
//! - `commands`: The `AuditService` command facade
//! - `config`, `error`, `utils`: Configuration, error types, time helpers
//!
//! # Example
//!
//! ```no_run
//! use worldlog::{AuditConfig, AuditService, MemoryWorld, RollbackRequest};
//!
//! let service = AuditService::open(AuditConfig::from_env()).unwrap();
//! let mut world = MemoryWorld::new();
//! let result = service
//!     .rollback(&RollbackRequest::actor("staff", "u-griefer", "1h"), &mut world)
//!     .unwrap();
//! println!("{}", result);
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod event_store;
pub mod inspect;
pub mod recorder;
pub mod restore;
pub mod rollback;
pub mod snapshots;
pub mod types;
pub mod utils;
pub mod world;

// Re-export commonly used items at crate root
pub use commands::{AuditService, LookupRequest, RollbackRequest};
pub use config::{AuditConfig, EngineConfig, RecorderConfig};
pub use error::{ApplyError, CommandError, ParseError, ScopeError, StoreError, StoreResult};
pub use event_store::{EventFilter, EventStore, EventStoreStats, PurgeCounts, RegionCursor};
pub use inspect::{Corner, InspectionSessions};
pub use recorder::EventRecorder;
pub use restore::{RestoreEngine, RestoreResult};
pub use rollback::{ApplyJob, CancelHandle, RollbackEngine, RollbackResult, RollbackState};
pub use snapshots::InventorySnapshots;
pub use types::{
    Action, BlockPos, ChangeEvent, EventCategory, InventoryContents, InventorySnapshot, Location, Mutation,
    Region, RollbackMarker, Scope, State, Target, Window,
};
pub use world::{MemoryWorld, WorldPort};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
