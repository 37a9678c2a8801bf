//! AuditService - command facade
//!
//! Maps the staff command surface (`lookup`, `rollback`, `restore`,
//! `inventory-rollback`, `purge`, inspect-mode clicks) onto store queries
//! and the rollback/restore engines. Arguments arrive as human time strings
//! and optional selections; everything is resolved to a [`Scope`] and a
//! [`Window`] here.

mod request;

pub use request::{LookupRequest, RollbackRequest};

use std::sync::Arc;

use crate::config::AuditConfig;
use crate::error::{CommandError, ScopeError, StoreResult};
use crate::event_store::{EventFilter, EventStore, PurgeCounts};
use crate::inspect::InspectionSessions;
use crate::restore::{RestoreEngine, RestoreResult};
use crate::rollback::{RollbackEngine, RollbackResult};
use crate::types::{BlockPos, ChangeEvent, EventCategory, Region, RollbackMarker, Scope, Window};
use crate::utils::{now_millis, parse_duration};
use crate::world::WorldPort;

/// Entry point for command handlers
#[derive(Clone)]
pub struct AuditService {
    config: AuditConfig,
    store: EventStore,
    rollback: RollbackEngine,
    restore: RestoreEngine,
    sessions: Arc<InspectionSessions>,
}

impl AuditService {
    pub fn new(store: EventStore, config: AuditConfig) -> Self {
        Self {
            rollback: RollbackEngine::new(store.clone(), config.engine.clone()),
            restore: RestoreEngine::new(store.clone(), config.engine.clone()),
            sessions: Arc::new(InspectionSessions::new()),
            store,
            config,
        }
    }

    /// Open the configured database and build the service on it
    pub fn open(config: AuditConfig) -> StoreResult<Self> {
        let store = EventStore::open(&config)?;
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<InspectionSessions> {
        &self.sessions
    }

    pub fn rollback_engine(&self) -> &RollbackEngine {
        &self.rollback
    }

    pub fn restore_engine(&self) -> &RestoreEngine {
        &self.restore
    }

    /// Events matching an actor and/or region over a time string,
    /// newest first
    ///
    /// A storage failure yields an empty result and a warning.
    pub fn lookup(&self, request: &LookupRequest) -> Result<Vec<ChangeEvent>, CommandError> {
        let since = now_millis().saturating_sub(parse_duration(&request.time)?);
        let limit = request.limit.unwrap_or(self.config.lookup_limit).max(1);
        let region = self.resolve_region(&request.issuer_id, request.region.clone(), request.use_selection)?;

        let result = match (region, &request.actor) {
            (None, None) => return Err(ScopeError::NoScope.into()),
            (None, Some(actor)) => self.store.query_by_actor(actor, since, limit),
            (Some(region), actor) => {
                let filter = EventFilter {
                    world: Some(region.world.clone()),
                    bounds: Some((region.min, region.max)),
                    actors: actor.iter().cloned().collect(),
                    since,
                    ..Default::default()
                };
                newest_first(&self.store, filter, limit)
            }
        };

        Ok(result.unwrap_or_else(|e| {
            tracing::warn!(issuer = %request.issuer_id, error = %e, "Lookup failed");
            Vec::new()
        }))
    }

    /// Inspect-mode lookup of a single coordinate
    pub fn lookup_at(&self, world: &str, pos: BlockPos, time: &str) -> Result<Vec<ChangeEvent>, CommandError> {
        let since = now_millis().saturating_sub(parse_duration(time)?);
        let mut events = self.store.query_by_location(world, pos, since).unwrap_or_else(|e| {
            tracing::warn!(world, pos = %pos, error = %e, "Point lookup failed");
            Vec::new()
        });
        events.truncate(self.config.lookup_limit);
        Ok(events)
    }

    /// Undo everything matching the request over the trailing time span
    pub fn rollback<P: WorldPort + ?Sized>(
        &self,
        request: &RollbackRequest,
        port: &mut P,
    ) -> Result<RollbackResult, CommandError> {
        let (scope, window) = self.rollback_scope(request)?;
        Ok(self.rollback.run(&request.issuer_id, scope, window, port)?)
    }

    /// Resolve a rollback request without running it
    ///
    /// Hosts that drive the apply phase themselves pass the result to
    /// [`RollbackEngine::prepare_async`].
    pub fn rollback_scope(&self, request: &RollbackRequest) -> Result<(Scope, Window), CommandError> {
        let window = Window::last(parse_duration(&request.time)?, now_millis());
        let region = self.resolve_region(&request.issuer_id, request.region.clone(), request.use_selection)?;

        let scope = Scope {
            region,
            actors: request.actors.clone(),
            categories: request
                .categories
                .clone()
                .unwrap_or_else(|| EventCategory::ALL.to_vec()),
        };
        Ok((scope, window))
    }

    /// Roll back only one actor's inventory
    pub fn inventory_rollback<P: WorldPort + ?Sized>(
        &self,
        issuer_id: &str,
        actor_id: &str,
        time: &str,
        port: &mut P,
    ) -> Result<RollbackResult, CommandError> {
        let request = RollbackRequest::actor(issuer_id, actor_id, time).only(&[EventCategory::Inventory]);
        self.rollback(&request, port)
    }

    pub fn restore<P: WorldPort + ?Sized>(&self, marker_id: i64, port: &mut P) -> Result<RestoreResult, CommandError> {
        Ok(self.restore.run(marker_id, port)?)
    }

    /// Delete everything older than the given time string
    pub fn purge(&self, time: &str) -> Result<PurgeCounts, CommandError> {
        let cutoff = now_millis().saturating_sub(parse_duration(time)?);
        Ok(self.store.purge_before(cutoff)?)
    }

    /// Purge with the configured retention
    pub fn purge_expired(&self) -> Result<PurgeCounts, CommandError> {
        Ok(self.store.purge(self.config.retention_days)?)
    }

    pub fn markers(&self, limit: usize) -> Result<Vec<RollbackMarker>, CommandError> {
        Ok(self.store.recent_markers(limit)?)
    }

    /// Disconnect cleanup
    pub fn forget(&self, actor_id: &str) {
        self.sessions.clear(actor_id);
    }

    fn resolve_region(
        &self,
        issuer_id: &str,
        explicit: Option<Region>,
        use_selection: bool,
    ) -> Result<Option<Region>, CommandError> {
        match (explicit, use_selection) {
            (Some(region), _) => Ok(Some(region)),
            (None, true) => self
                .sessions
                .selection(issuer_id)
                .map(Some)
                .ok_or_else(|| CommandError::NoSelection(issuer_id.to_string())),
            (None, false) => Ok(None),
        }
    }
}

/// Drain a cursor keeping only the `limit` newest events
fn newest_first(store: &EventStore, filter: EventFilter, limit: usize) -> StoreResult<Vec<ChangeEvent>> {
    let mut events: Vec<ChangeEvent> = Vec::new();
    let newest = |a: &ChangeEvent, b: &ChangeEvent| b.order_key().cmp(&a.order_key());

    for event in store.query(filter) {
        events.push(event?);
        if events.len() >= limit.saturating_mul(2) {
            events.sort_by(newest);
            events.truncate(limit);
        }
    }

    events.sort_by(newest);
    events.truncate(limit);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::Corner;
    use crate::types::{Action, Location, Mutation, State};

    fn service() -> AuditService {
        AuditService::new(EventStore::open_in_memory().unwrap(), AuditConfig::default())
    }

    fn place(actor: &str, x: i32, ts: i64) -> ChangeEvent {
        Mutation::new(
            actor,
            actor,
            "world",
            Action::BlockPlace { at: BlockPos::new(x, 64, 0) },
            State::air(),
            State::block("stone"),
        )
        .at(ts)
        .into_event(0)
    }

    #[test]
    fn test_lookup_region_newest_first_with_limit() {
        let service = service();
        let now = now_millis();
        let events: Vec<_> = (0..10).map(|x| place("u-alice", x, now - 1_000 + x as i64)).collect();
        service.store().append_batch(&events).unwrap();

        let region = Region::new("world", BlockPos::new(0, 0, 0), BlockPos::new(9, 100, 0));
        let found = service
            .lookup(&LookupRequest::region("staff", region, "1h").limit(3))
            .unwrap();
        let xs: Vec<i32> = found.iter().map(|e| e.coordinate().unwrap().x).collect();
        assert_eq!(xs, vec![9, 8, 7]);
    }

    #[test]
    fn test_lookup_with_unbounded_limit() {
        let service = service();
        let now = now_millis();
        let events: Vec<_> = (0..10).map(|x| place("u-alice", x, now - 100 + x as i64)).collect();
        service.store().append_batch(&events).unwrap();

        let region = Region::new("world", BlockPos::new(0, 0, 0), BlockPos::new(9, 100, 0));
        let found = service
            .lookup(&LookupRequest::region("staff", region, "1h").limit(usize::MAX))
            .unwrap();
        assert_eq!(found.len(), 10);
        assert_eq!(found[0].coordinate().unwrap().x, 9);
    }

    #[test]
    fn test_lookup_requires_scope_and_valid_time() {
        let service = service();
        let request = LookupRequest {
            issuer_id: "staff".to_string(),
            time: "1h".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            service.lookup(&request),
            Err(CommandError::Scope(ScopeError::NoScope))
        ));
        assert!(matches!(
            service.lookup(&LookupRequest::actor("staff", "u-alice", "1y")),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn test_selection_scoped_lookup() {
        let service = service();
        let now = now_millis();
        service
            .store()
            .append_batch(&[place("u-alice", 2, now - 10), place("u-bob", 40, now - 10)])
            .unwrap();

        let request = LookupRequest {
            issuer_id: "staff".to_string(),
            time: "1h".to_string(),
            ..Default::default()
        }
        .selection();
        assert!(matches!(service.lookup(&request), Err(CommandError::NoSelection(_))));

        let sessions = service.sessions();
        sessions.set_corner("staff", Corner::A, Location::new("world", BlockPos::new(0, 0, -1)));
        sessions.set_corner("staff", Corner::B, Location::new("world", BlockPos::new(5, 100, 1)));

        let found = service.lookup(&request).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].actor_id, "u-alice");
    }

    #[test]
    fn test_rollback_scope_from_request() {
        let service = service();
        let (scope, window) = service
            .rollback_scope(&RollbackRequest::actor("staff", "u-alice", "30m"))
            .unwrap();
        assert_eq!(scope.actors, vec!["u-alice".to_string()]);
        assert_eq!(window.duration_ms(), 30 * 60 * 1000 + 1);
    }
}
