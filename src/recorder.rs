//! Asynchronous event recorder
//!
//! Mutation hooks call [`EventRecorder::record`] from the host's primary
//! context. The call never blocks: the event goes onto a bounded channel and
//! a background worker batches it into the store, flushing on a timer or
//! when the batch is full.
//!
//! ```text
//! ┌──────────┐ try_send ┌───────────────┐ flush ┌───────────────────┐
//! │ record() │─────────►│ bounded queue │──────►│ spawn_blocking    │
//! │ capture  │          │ (mpsc)        │       │ append_records()  │
//! └──────────┘          └───────────────┘       │ retry w/ backoff  │
//!                                               └───────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::config::RecorderConfig;
use crate::error::StoreResult;
use crate::event_store::EventStore;
use crate::types::{ChangeEvent, InventorySnapshot, Mutation};
use crate::utils::now_millis;

/// One unit of work for the persistence worker
#[derive(Debug, Clone)]
pub enum Record {
    Event(ChangeEvent),
    Snapshot(InventorySnapshot),
}

/// Counters shared between the recorder handle and its worker
#[derive(Debug, Default)]
pub struct RecorderStats {
    queued: AtomicU64,
    persisted: AtomicU64,
    dropped: AtomicU64,
    failed_batches: AtomicU64,
}

impl RecorderStats {
    /// Records accepted onto the queue
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// Records written to the store
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    /// Records lost to a full/closed queue or an exhausted retry budget
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Batches abandoned after every retry failed
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }
}

/// Fire-and-forget front end of the audit log
pub struct EventRecorder {
    tx: Mutex<Option<mpsc::Sender<Record>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<RecorderStats>,
}

impl EventRecorder {
    /// Start the persistence worker on the current tokio runtime
    pub fn spawn(store: EventStore, config: RecorderConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(RecorderStats::default());

        let batcher = RecordBatcher::new(store, config, Arc::clone(&stats));
        let worker = tokio::spawn(batcher.run(rx));

        tracing::debug!("Event recorder started");

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            stats,
        }
    }

    /// Queue a mutation for persistence
    ///
    /// Stamps the capture time if the mutation has none. Returns `false` if
    /// the event was dropped because the queue is full or closed.
    pub fn record(&self, mutation: Mutation) -> bool {
        let event = mutation.into_event(now_millis());
        self.enqueue(Record::Event(event))
    }

    /// Queue an inventory snapshot on the same path as events
    pub fn capture_snapshot(&self, snapshot: InventorySnapshot) -> bool {
        self.enqueue(Record::Snapshot(snapshot))
    }

    fn enqueue(&self, record: Record) -> bool {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            self.drop_record("recorder shut down");
            return false;
        };

        match tx.try_send(record) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.drop_record("queue full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.drop_record("worker gone");
                false
            }
        }
    }

    fn drop_record(&self, reason: &str) {
        let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(reason, dropped, "Dropped audit record");
    }

    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }

    /// Shorthand for `stats().dropped()`
    pub fn dropped(&self) -> u64 {
        self.stats.dropped()
    }

    /// Close the queue and wait until everything queued has been written
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        // dropping the last sender lets the worker drain and exit
        self.tx.lock().take();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Recorder worker panicked");
            }
        }

        tracing::info!(
            persisted = self.stats.persisted(),
            dropped = self.stats.dropped(),
            "Event recorder stopped"
        );
    }
}

/// Worker side: collects records and writes them in batches
struct RecordBatcher {
    store: EventStore,
    config: RecorderConfig,
    stats: Arc<RecorderStats>,

    /// Pending events, in enqueue order
    events: Vec<ChangeEvent>,
    snapshots: Vec<InventorySnapshot>,
}

impl RecordBatcher {
    fn new(store: EventStore, config: RecorderConfig, stats: Arc<RecorderStats>) -> Self {
        Self {
            store,
            config,
            stats,
            events: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    fn pending(&self) -> usize {
        self.events.len() + self.snapshots.len()
    }

    async fn push(&mut self, record: Record) {
        match record {
            Record::Event(event) => self.events.push(event),
            Record::Snapshot(snapshot) => self.snapshots.push(snapshot),
        }

        // Force flush if buffer is full
        if self.pending() >= self.config.max_batch_size.max(1) {
            self.flush().await;
        }
    }

    /// Write everything buffered, retrying with backoff
    async fn flush(&mut self) {
        if self.pending() == 0 {
            return;
        }

        let mut events = std::mem::take(&mut self.events);
        let mut snapshots = std::mem::take(&mut self.snapshots);
        let count = (events.len() + snapshots.len()) as u64;
        let mut attempt = 0;

        loop {
            let store = self.store.clone();
            let (returned_events, returned_snapshots, result) = match tokio::task::spawn_blocking(move || {
                let result = write_batch(&store, &events, &snapshots);
                (events, snapshots, result)
            })
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                    self.stats.dropped.fetch_add(count, Ordering::Relaxed);
                    tracing::error!(error = %e, records = count, "Recorder write task failed");
                    return;
                }
            };

            match result {
                Ok(()) => {
                    self.stats.persisted.fetch_add(count, Ordering::Relaxed);
                    tracing::trace!(records = count, "Flushed audit batch");
                    return;
                }
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Audit batch write failed, retrying"
                    );
                    attempt += 1;
                    events = returned_events;
                    snapshots = returned_snapshots;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                    self.stats.dropped.fetch_add(count, Ordering::Relaxed);
                    tracing::error!(
                        error = %e,
                        records = count,
                        attempts = attempt + 1,
                        "Dropping audit batch after repeated write failures"
                    );
                    return;
                }
            }
        }
    }

    /// Receive records until every sender is gone, then flush and exit
    async fn run(mut self, mut rx: mpsc::Receiver<Record>) {
        let mut timer = interval(self.config.flush_interval());

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.flush().await;
                }

                record = rx.recv() => {
                    match record {
                        Some(record) => self.push(record).await,
                        None => {
                            self.flush().await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn write_batch(store: &EventStore, events: &[ChangeEvent], snapshots: &[InventorySnapshot]) -> StoreResult<()> {
    store.append_records(events, snapshots)?;
    Ok(())
}
