//! Batched application of planned writes
//!
//! An [`ApplyJob`] is produced by the collect/compute phase and driven by
//! the host, one [`ApplyJob::apply_batch`] call per tick, so no single tick
//! issues more than `apply_batch_size` writes. Committing the outcome to the
//! store happens once, in `finish`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::event_store::EventStore;
use crate::types::{RollbackMarker, Scope, State, Window};
use crate::utils::now_millis;
use crate::world::WorldPort;

use super::plan::PlannedWrite;
use super::{RollbackResult, RollbackState};

/// Stops a job between batches
///
/// Cloneable; hand it to whoever may need to abort the job.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a job will commit when finished
#[derive(Debug, Clone)]
pub(crate) enum JobKind {
    Rollback {
        issuer_id: String,
        scope: Scope,
        window: Window,
    },
    Restore {
        marker_id: i64,
    },
}

/// A computed rollback or restore waiting to be applied
#[derive(Debug)]
pub struct ApplyJob {
    kind: JobKind,
    state: RollbackState,
    writes: Vec<PlannedWrite>,
    next: usize,
    batch_size: usize,
    max_errors: usize,
    cancel: CancelHandle,
    started: Instant,

    matched_events: usize,
    applied: usize,
    skipped: usize,
    drifted: usize,
    applied_event_ids: Vec<i64>,
    errors: Vec<String>,
    /// Errors beyond `max_errors` are only counted
    suppressed_errors: usize,
}

impl ApplyJob {
    pub(crate) fn new(kind: JobKind, writes: Vec<PlannedWrite>, matched_events: usize, config: &EngineConfig) -> Self {
        Self {
            kind,
            state: RollbackState::Computing,
            writes,
            next: 0,
            batch_size: config.apply_batch_size.max(1),
            max_errors: config.max_reported_errors,
            cancel: CancelHandle::default(),
            started: Instant::now(),
            matched_events,
            applied: 0,
            skipped: 0,
            drifted: 0,
            applied_event_ids: Vec::new(),
            errors: Vec::new(),
            suppressed_errors: 0,
        }
    }

    /// A job that already finished with nothing to do
    pub(crate) fn done(kind: JobKind, config: &EngineConfig) -> Self {
        let mut job = Self::new(kind, Vec::new(), 0, config);
        job.state = RollbackState::Done;
        job
    }

    /// A job whose collection failed; nothing will be applied
    pub(crate) fn failed(kind: JobKind, error: String, config: &EngineConfig) -> Self {
        let mut job = Self::new(kind, Vec::new(), 0, config);
        job.state = RollbackState::Failed;
        job.errors.push(error);
        job
    }

    pub fn state(&self) -> RollbackState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Events the collect phase matched
    pub fn matched_events(&self) -> usize {
        self.matched_events
    }

    /// Writes planned in total
    pub fn planned(&self) -> usize {
        self.writes.len()
    }

    /// Writes not yet attempted
    pub fn remaining(&self) -> usize {
        self.writes.len() - self.next
    }

    /// No further `apply_batch` call will do anything
    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// Issue up to one batch of writes through `port`
    ///
    /// Returns the number of writes attempted. A failing write is logged,
    /// counted as skipped and does not stop the batch.
    pub fn apply_batch<P: WorldPort + ?Sized>(&mut self, port: &mut P) -> usize {
        if self.is_complete() {
            return 0;
        }
        if self.cancel.is_cancelled() {
            self.state = RollbackState::Cancelled;
            tracing::info!(applied = self.applied, remaining = self.remaining(), "Apply job cancelled");
            return 0;
        }
        self.state = RollbackState::Applying;

        let end = (self.next + self.batch_size).min(self.writes.len());
        let attempted = end - self.next;

        for i in self.next..end {
            let write = &self.writes[i];

            if let Some(expected) = &write.expected {
                match port.get(&write.target) {
                    Ok(live) if !same_state(&live, expected) => {
                        self.drifted += 1;
                        tracing::debug!(key = %write.target, live = %live, expected = %expected, "Live state drifted");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(key = %write.target, error = %e, "Skipping unreadable target");
                        self.skipped += 1;
                        self.push_error(e.to_string());
                        continue;
                    }
                }
            }

            match port.set(&write.target, &write.state) {
                Ok(()) => {
                    self.applied += 1;
                    self.applied_event_ids.extend_from_slice(&write.event_ids);
                }
                Err(e) => {
                    tracing::warn!(key = %write.target, error = %e, "Write rejected");
                    self.skipped += 1;
                    self.push_error(e.to_string());
                }
            }
        }

        self.next = end;
        if self.next >= self.writes.len() {
            self.state = RollbackState::Done;
        }
        attempted
    }

    fn push_error(&mut self, error: String) {
        if self.errors.len() < self.max_errors {
            self.errors.push(error);
        } else {
            self.suppressed_errors += 1;
        }
    }

    /// Persist the outcome and produce the summary
    pub(crate) fn commit(mut self, store: &EventStore) -> RollbackResult {
        let mut marker_id = None;

        match self.state {
            RollbackState::Failed => {}
            state if !state.is_terminal() => {
                // finished before every batch ran; treat the rest as abandoned
                self.state = RollbackState::Cancelled;
                self.commit_applied(store, &mut marker_id);
            }
            _ => self.commit_applied(store, &mut marker_id),
        }

        if self.suppressed_errors > 0 {
            self.errors.push(format!("... and {} more errors", self.suppressed_errors));
        }

        RollbackResult {
            state: self.state,
            marker_id,
            matched_events: self.matched_events,
            applied: self.applied,
            skipped: self.skipped,
            drifted: self.drifted,
            errors: self.errors,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    fn commit_applied(&mut self, store: &EventStore, marker_id: &mut Option<i64>) {
        if self.applied_event_ids.is_empty() {
            return;
        }
        self.applied_event_ids.sort_unstable();
        self.applied_event_ids.dedup();

        let outcome = match &self.kind {
            JobKind::Rollback {
                issuer_id,
                scope,
                window,
            } => {
                let marker = RollbackMarker {
                    id: 0,
                    created_at: now_millis(),
                    issuer_id: issuer_id.clone(),
                    scope: scope.clone(),
                    window: *window,
                    applied_count: self.applied,
                    skipped_count: self.skipped,
                    event_ids: self.applied_event_ids.clone(),
                    restored_at: None,
                };
                store.commit_rollback(&marker).map(Some)
            }
            JobKind::Restore { marker_id } => {
                // a partial restore leaves the marker restorable for the rest
                let restored_at = (self.skipped == 0 && self.state == RollbackState::Done).then(now_millis);
                store
                    .commit_restore(*marker_id, &self.applied_event_ids, restored_at)
                    .map(|_| Some(*marker_id))
            }
        };

        match outcome {
            Ok(id) => *marker_id = id,
            Err(e) => {
                tracing::error!(error = %e, "Failed to commit apply outcome");
                self.state = RollbackState::Failed;
                self.errors.push(format!("commit failed: {}", e));
            }
        }
    }
}

/// Two states are the same if equal or both empty
fn same_state(a: &State, b: &State) -> bool {
    a == b || (a.is_air() && b.is_air())
}
