//! Restore engine
//!
//! Re-applies what a rollback undid. The event set comes from the marker,
//! not from a fresh scope query, so only changes that rollback actually
//! reverted are redone.

use crate::config::EngineConfig;
use crate::error::{ScopeError, StoreError};
use crate::event_store::EventStore;
use crate::rollback::{drive, log_result, ApplyJob, JobKind, RollbackResult};
use crate::rollback::plan::EventGroups;
use crate::world::WorldPort;

/// Restore summaries share the rollback shape
pub type RestoreResult = RollbackResult;

/// Redoes the events of a rollback marker
#[derive(Clone)]
pub struct RestoreEngine {
    store: EventStore,
    config: EngineConfig,
}

impl RestoreEngine {
    pub fn new(store: EventStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Load the marker's events and plan the latest `after` per target
    pub fn prepare(&self, marker_id: i64) -> Result<ApplyJob, ScopeError> {
        let _gate = self.store.purge_gate();

        let marker = self
            .store
            .marker(marker_id)?
            .ok_or(ScopeError::MarkerNotFound(marker_id))?;
        if marker.restored_at.is_some() {
            return Err(ScopeError::AlreadyRestored(marker_id));
        }

        let kind = JobKind::Restore { marker_id };
        let events = match self.store.events_by_ids(&marker.event_ids) {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(marker_id, error = %e, "Restore collection failed");
                return Ok(ApplyJob::failed(kind, e.to_string(), &self.config));
            }
        };

        if events.len() < marker.event_ids.len() {
            tracing::warn!(
                marker_id,
                expected = marker.event_ids.len(),
                found = events.len(),
                "Some rolled-back events were purged; restoring the rest"
            );
        }

        let mut groups = EventGroups::default();
        for event in events.iter().filter(|e| e.rolled_back) {
            groups.add(event);
        }
        if groups.is_empty() {
            return Ok(ApplyJob::done(kind, &self.config));
        }

        let matched = groups.matched();
        let writes = groups.into_restore_writes();
        tracing::info!(marker_id, matched, writes = writes.len(), "Restore computed");
        Ok(ApplyJob::new(kind, writes, matched, &self.config))
    }

    /// [`prepare`](Self::prepare) on a blocking worker thread
    pub async fn prepare_async(&self, marker_id: i64) -> Result<ApplyJob, ScopeError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.prepare(marker_id))
            .await
            .map_err(|e| ScopeError::Store(StoreError::from(e)))?
    }

    /// Clear the rolled-back flag of what was reapplied and summarize
    ///
    /// The marker is stamped restored only when every write landed.
    pub fn finish(&self, job: ApplyJob) -> RestoreResult {
        let result = job.commit(&self.store);
        log_result("Restore", &result);
        result
    }

    pub fn run<P: WorldPort + ?Sized>(&self, marker_id: i64, port: &mut P) -> Result<RestoreResult, ScopeError> {
        let mut job = self.prepare(marker_id)?;
        drive(&mut job, port);
        Ok(self.finish(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollback::{RollbackEngine, RollbackState};
    use crate::types::{Action, BlockPos, Mutation, Scope, State, Target, Window};
    use crate::world::MemoryWorld;

    fn engines() -> (RollbackEngine, RestoreEngine) {
        let store = EventStore::open_in_memory().unwrap();
        (
            RollbackEngine::new(store.clone(), EngineConfig::default()),
            RestoreEngine::new(store, EngineConfig::default()),
        )
    }

    #[test]
    fn test_rollback_then_restore_round_trip() {
        let (rollback, restore) = engines();
        let chest = BlockPos::new(3, 64, 3);
        rollback
            .store()
            .append_batch(&[
                Mutation::new(
                    "u-alice",
                    "Alice",
                    "world",
                    Action::ContainerSlotChange { at: chest, slot: 0 },
                    State::item("diamond", 5),
                    State::item("diamond", 2),
                )
                .at(10)
                .into_event(0),
                Mutation::new(
                    "u-alice",
                    "Alice",
                    "world",
                    Action::ContainerSlotChange { at: chest, slot: 0 },
                    State::item("diamond", 2),
                    State::air(),
                )
                .at(20)
                .into_event(0),
            ])
            .unwrap();

        let target = Target::container("world", chest, 0);
        let mut world = MemoryWorld::new().with(target.clone(), State::air());

        let undone = rollback
            .run("staff", Scope::actor("u-alice"), Window::new(0, 100), &mut world)
            .unwrap();
        assert_eq!(world.state(&target), State::item("diamond", 5));

        let marker_id = undone.marker_id.unwrap();
        let redone = restore.run(marker_id, &mut world).unwrap();
        assert_eq!(redone.state, RollbackState::Done);
        assert_eq!(redone.matched_events, 2);
        assert!(world.state(&target).is_air());

        let marker = rollback.store().marker(marker_id).unwrap().unwrap();
        assert!(marker.restored_at.is_some());
        assert!(matches!(
            restore.prepare(marker_id),
            Err(ScopeError::AlreadyRestored(id)) if id == marker_id
        ));

        // the events are live again, so a new rollback picks them up
        let again = rollback
            .run("staff", Scope::actor("u-alice"), Window::new(0, 100), &mut world)
            .unwrap();
        assert_eq!(again.matched_events, 2);
    }

    #[test]
    fn test_unknown_marker() {
        let (_, restore) = engines();
        assert!(matches!(restore.prepare(42), Err(ScopeError::MarkerNotFound(42))));
    }

    #[test]
    fn test_partial_restore_keeps_marker_open() {
        let (rollback, restore) = engines();
        let a = BlockPos::new(0, 64, 0);
        let b = BlockPos::new(1, 64, 0);
        rollback
            .store()
            .append_batch(&[
                Mutation::new("u-bob", "Bob", "world", Action::BlockBreak { at: a }, State::block("oak_log"), State::air())
                    .at(1)
                    .into_event(0),
                Mutation::new("u-bob", "Bob", "world", Action::BlockBreak { at: b }, State::block("oak_log"), State::air())
                    .at(2)
                    .into_event(0),
            ])
            .unwrap();

        let mut world = MemoryWorld::new();
        let marker_id = rollback
            .run("staff", Scope::actor("u-bob"), Window::new(0, 10), &mut world)
            .unwrap()
            .marker_id
            .unwrap();

        world.reject(Target::block("world", b));
        let partial = restore.run(marker_id, &mut world).unwrap();
        assert_eq!((partial.applied, partial.skipped), (1, 1));
        assert!(rollback.store().marker(marker_id).unwrap().unwrap().restored_at.is_none());

        // only the still-flagged event is picked up the second time
        let mut healed = MemoryWorld::new();
        let rest = restore.run(marker_id, &mut healed).unwrap();
        assert_eq!(rest.matched_events, 1);
        assert!(rest.is_success());
        assert!(healed.state(&Target::block("world", b)).is_air());
    }
}
