//! Rollback engine
//!
//! Undoes every live event matching a scope inside a time window by writing
//! each affected target back to the `before` state of its earliest matched
//! event.
//!
//! # Phases
//!
//! ```text
//! ┌──────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ Idle │──►│ Collecting │──►│ Computing │──►│ Applying │──►│ Done         │
//! └──────┘   │ cursor +   │   │ group by  │   │ per-tick │   │ Failed       │
//!            │ purge gate │   │ target    │   │ batches  │   │ Cancelled    │
//!            └────────────┘   └───────────┘   └──────────┘   └──────────────┘
//!            \________ prepare() ________/    apply_batch()     finish()
//! ```
//!
//! Collecting and Computing may run off the host's primary context
//! ([`RollbackEngine::prepare_async`]); Applying must run where the
//! [`WorldPort`] lives.

mod apply;
pub(crate) mod inventory;
pub(crate) mod plan;

use std::fmt;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ScopeError, StoreError, StoreResult};
use crate::event_store::{EventFilter, EventStore};
use crate::types::{Scope, Window};
use crate::world::WorldPort;

pub(crate) use apply::JobKind;
pub use apply::{ApplyJob, CancelHandle};
pub use plan::PlannedWrite;

use plan::EventGroups;

/// Lifecycle of a rollback or restore job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackState {
    Idle,
    Collecting,
    Computing,
    Applying,
    Done,
    Failed,
    Cancelled,
}

impl RollbackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RollbackState::Done | RollbackState::Failed | RollbackState::Cancelled)
    }
}

impl fmt::Display for RollbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RollbackState::Idle => "idle",
            RollbackState::Collecting => "collecting",
            RollbackState::Computing => "computing",
            RollbackState::Applying => "applying",
            RollbackState::Done => "done",
            RollbackState::Failed => "failed",
            RollbackState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Summary of a finished rollback or restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    pub state: RollbackState,
    /// Marker written (rollback) or consumed (restore), if any
    pub marker_id: Option<i64>,
    pub matched_events: usize,
    /// Writes that landed
    pub applied: usize,
    /// Writes that failed and were skipped
    pub skipped: usize,
    /// Targets whose live state differed from what the log predicted
    pub drifted: usize,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl RollbackResult {
    /// Finished without touching anything
    pub fn noop() -> Self {
        Self {
            state: RollbackState::Done,
            marker_id: None,
            matched_events: 0,
            applied: 0,
            skipped: 0,
            drifted: 0,
            errors: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RollbackState::Done && self.skipped == 0
    }
}

impl fmt::Display for RollbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} events, {} applied, {} skipped, {} drifted in {}ms",
            self.state, self.matched_events, self.applied, self.skipped, self.drifted, self.elapsed_ms
        )
    }
}

/// Computes and applies the inverse of a scoped set of events
#[derive(Clone)]
pub struct RollbackEngine {
    store: EventStore,
    config: EngineConfig,
}

impl RollbackEngine {
    pub fn new(store: EventStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Collect and compute; the returned job is ready to apply
    ///
    /// Scope problems are rejected before any query runs. A zero-width
    /// window yields a job that is already done. Storage failures while
    /// collecting yield a `Failed` job rather than an error so the caller
    /// still gets a summary from `finish`.
    pub fn prepare(&self, issuer_id: &str, scope: Scope, window: Window) -> Result<ApplyJob, ScopeError> {
        if window.start > window.end {
            return Err(ScopeError::InvertedWindow {
                start: window.start,
                end: window.end,
            });
        }
        scope.validate()?;

        let kind = JobKind::Rollback {
            issuer_id: issuer_id.to_string(),
            scope: scope.clone(),
            window,
        };

        if window.is_empty() {
            tracing::debug!(scope = %scope, "Zero-width rollback window, nothing to do");
            return Ok(ApplyJob::done(kind, &self.config));
        }

        tracing::info!(issuer = issuer_id, scope = %scope, window = %window, "Rollback collecting");

        match self.collect(&scope, window) {
            Ok((_, writes)) if writes.is_empty() => Ok(ApplyJob::done(kind, &self.config)),
            Ok((matched, writes)) => {
                tracing::info!(matched, writes = writes.len(), "Rollback computed");
                Ok(ApplyJob::new(kind, writes, matched, &self.config))
            }
            Err(e) => {
                tracing::error!(error = %e, "Rollback collection failed");
                Ok(ApplyJob::failed(kind, e.to_string(), &self.config))
            }
        }
    }

    /// [`prepare`](Self::prepare) on a blocking worker thread
    pub async fn prepare_async(&self, issuer_id: &str, scope: Scope, window: Window) -> Result<ApplyJob, ScopeError> {
        let engine = self.clone();
        let issuer_id = issuer_id.to_string();
        tokio::task::spawn_blocking(move || engine.prepare(&issuer_id, scope, window))
            .await
            .map_err(|e| ScopeError::Store(StoreError::from(e)))?
    }

    /// Persist the marker for what was applied and summarize
    pub fn finish(&self, job: ApplyJob) -> RollbackResult {
        let result = job.commit(&self.store);
        log_result("Rollback", &result);
        result
    }

    /// Run every phase to completion against `port`
    pub fn run<P: WorldPort + ?Sized>(
        &self,
        issuer_id: &str,
        scope: Scope,
        window: Window,
        port: &mut P,
    ) -> Result<RollbackResult, ScopeError> {
        let mut job = self.prepare(issuer_id, scope, window)?;
        drive(&mut job, port);
        Ok(self.finish(job))
    }

    /// Stream matching live events and turn them into planned writes
    fn collect(&self, scope: &Scope, window: Window) -> StoreResult<(usize, Vec<PlannedWrite>)> {
        let _gate = self.store.purge_gate();

        let mut groups = EventGroups::default();
        let filter = EventFilter::from_scope(scope, window).rolled_back(false);
        for event in self.store.query(filter) {
            groups.add(&event?);
        }

        let matched = groups.matched();
        let inventories = groups.take_inventory();
        let mut writes = groups.into_rollback_writes();
        for (actor_id, touched) in inventories {
            writes.extend(inventory::plan_inventory(&self.store, &actor_id, window, touched)?);
        }

        Ok((matched, writes))
    }
}

/// Apply batches until the job reaches a terminal state
pub(crate) fn drive<P: WorldPort + ?Sized>(job: &mut ApplyJob, port: &mut P) {
    while !job.is_complete() {
        job.apply_batch(port);
    }
}

pub(crate) fn log_result(operation: &str, result: &RollbackResult) {
    match result.state {
        RollbackState::Done => tracing::info!(
            operation,
            marker_id = result.marker_id,
            matched = result.matched_events,
            applied = result.applied,
            skipped = result.skipped,
            drifted = result.drifted,
            elapsed_ms = result.elapsed_ms,
            "Apply job finished"
        ),
        _ => tracing::warn!(
            operation,
            state = %result.state,
            marker_id = result.marker_id,
            applied = result.applied,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Apply job did not complete"
        ),
    }
}
