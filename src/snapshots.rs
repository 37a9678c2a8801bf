//! Inventory snapshot capture
//!
//! Snapshots anchor inventory rollback. The host captures one at join and
//! around bulk inventory changes, and calls `capture_if_due` periodically
//! so every actor has a recent anchor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::AuditConfig;
use crate::error::ApplyError;
use crate::recorder::EventRecorder;
use crate::types::InventorySnapshot;
use crate::utils::now_millis;
use crate::world::WorldPort;

/// Captures full inventories through the recorder
pub struct InventorySnapshots {
    recorder: Arc<EventRecorder>,
    interval_ms: i64,
    /// Last capture time per actor
    last_capture: Mutex<HashMap<String, i64>>,
}

impl InventorySnapshots {
    pub fn new(recorder: Arc<EventRecorder>, interval_ms: i64) -> Self {
        Self {
            recorder,
            interval_ms,
            last_capture: Mutex::new(HashMap::new()),
        }
    }

    /// Periodic captures spaced by `snapshot_interval_ms`
    pub fn from_config(recorder: Arc<EventRecorder>, config: &AuditConfig) -> Self {
        Self::new(recorder, config.snapshot_interval_ms)
    }

    /// Read the actor's inventory from `port` and queue a snapshot
    ///
    /// Returns whether the snapshot was queued.
    pub fn capture<P: WorldPort + ?Sized>(&self, actor_id: &str, actor_name: &str, port: &P) -> Result<bool, ApplyError> {
        self.capture_at(actor_id, actor_name, port, now_millis())
    }

    pub fn capture_at<P: WorldPort + ?Sized>(
        &self,
        actor_id: &str,
        actor_name: &str,
        port: &P,
        now: i64,
    ) -> Result<bool, ApplyError> {
        let contents = port.inventory(actor_id)?;
        let slots = contents.len();
        let queued = self
            .recorder
            .capture_snapshot(InventorySnapshot::new(now, actor_id, actor_name, contents));

        if queued {
            self.last_capture.lock().insert(actor_id.to_string(), now);
            tracing::debug!(actor_id, slots, "Inventory snapshot queued");
        }
        Ok(queued)
    }

    /// Capture only if the interval has passed since the last capture
    pub fn capture_if_due<P: WorldPort + ?Sized>(
        &self,
        actor_id: &str,
        actor_name: &str,
        port: &P,
    ) -> Result<bool, ApplyError> {
        self.capture_if_due_at(actor_id, actor_name, port, now_millis())
    }

    pub fn capture_if_due_at<P: WorldPort + ?Sized>(
        &self,
        actor_id: &str,
        actor_name: &str,
        port: &P,
        now: i64,
    ) -> Result<bool, ApplyError> {
        if !self.is_due(actor_id, now) {
            return Ok(false);
        }
        self.capture_at(actor_id, actor_name, port, now)
    }

    fn is_due(&self, actor_id: &str, now: i64) -> bool {
        match self.last_capture.lock().get(actor_id) {
            Some(last) => now.saturating_sub(*last) >= self.interval_ms,
            None => true,
        }
    }

    /// Drop the schedule entry for an actor (disconnect)
    pub fn forget(&self, actor_id: &str) {
        self.last_capture.lock().remove(actor_id);
    }
}
