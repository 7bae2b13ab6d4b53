//! Background visit recorder
//!
//! Uses an actor per shard, each owning one mpsc receiver. A code always hashes
//! to the same shard, so visits to one link are persisted in the order they
//! were enqueued while different links are written in parallel.
//!
//! Enqueueing never blocks: when a shard's buffer is full the visit is dropped
//! and a warning is logged. Persistence failures are logged and dropped too.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::Visit;
use crate::storage::{LinkStore, StorageError};

/// Message types for a recorder shard
enum RecorderMessage {
    /// Append one visit
    Record { code: String, visit: Visit },
    /// Acknowledge once every earlier message on this shard has been handled
    Flush(oneshot::Sender<()>),
    /// Stop after acknowledging
    Shutdown(oneshot::Sender<()>),
}

struct VisitWorker {
    shard: usize,
    receiver: mpsc::Receiver<RecorderMessage>,
    store: Arc<dyn LinkStore>,
    failed: Arc<AtomicU64>,
}

impl VisitWorker {
    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                RecorderMessage::Record { code, visit } => self.persist(&code, &visit).await,
                RecorderMessage::Flush(ack) => {
                    let _ = ack.send(());
                }
                RecorderMessage::Shutdown(ack) => {
                    debug!(shard = self.shard, "visit worker stopping");
                    let _ = ack.send(());
                    return;
                }
            }
        }

        debug!(shard = self.shard, "visit worker channel closed");
    }

    async fn persist(&self, code: &str, visit: &Visit) {
        match self.store.record_visit(code, visit).await {
            Ok(link) => {
                debug!(short_code = %code, clicks = link.click_count, "visit recorded");
            }
            Err(StorageError::NotFound) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(short_code = %code, "visit dropped, link no longer exists");
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(short_code = %code, error = %err, "failed to record visit, dropping");
            }
        }
    }
}

pub struct VisitRecorder {
    shards: Vec<mpsc::Sender<RecorderMessage>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
    failed: Arc<AtomicU64>,
}

impl VisitRecorder {
    /// Spawn `workers` shard actors, each with a queue of `buffer_size` visits.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn LinkStore>, workers: usize, buffer_size: usize) -> Self {
        let workers = workers.max(1);
        let failed = Arc::new(AtomicU64::new(0));
        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(buffer_size.max(1));
            let worker = VisitWorker {
                shard,
                receiver: rx,
                store: Arc::clone(&store),
                failed: Arc::clone(&failed),
            };
            handles.push(tokio::spawn(worker.run()));
            shards.push(tx);
        }

        info!(workers, buffer_size, "visit recorder started");

        Self {
            shards,
            workers: Mutex::new(handles),
            dropped: AtomicU64::new(0),
            failed,
        }
    }

    fn shard_for(&self, code: &str) -> &mpsc::Sender<RecorderMessage> {
        let mut hasher = DefaultHasher::new();
        code.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Enqueue a visit without waiting for it to be written.
    pub fn record(&self, code: &str, visit: Visit) {
        let msg = RecorderMessage::Record {
            code: code.to_string(),
            visit,
        };

        if let Err(err) = self.shard_for(code).try_send(msg) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(short_code = %code, "visit buffer full, dropping visit");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!(short_code = %code, "visit recorder stopped, dropping visit");
                }
            }
        }
    }

    /// Wait until every visit enqueued before this call has been handled.
    pub async fn flush(&self) {
        let mut acks = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let (tx, rx) = oneshot::channel();
            if shard.send(RecorderMessage::Flush(tx)).await.is_ok() {
                acks.push(rx);
            }
        }

        for ack in acks {
            let _ = ack.await;
        }
    }

    /// Drain queued visits and stop all workers. Later visits are dropped.
    pub async fn shutdown(&self) {
        let mut acks = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let (tx, rx) = oneshot::channel();
            if shard.send(RecorderMessage::Shutdown(tx)).await.is_ok() {
                acks.push(rx);
            }
        }
        for ack in acks {
            let _ = ack.await;
        }

        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "visit worker panicked");
            }
        }

        info!(
            dropped = self.dropped(),
            failed = self.failed(),
            "visit recorder stopped"
        );
    }

    /// Visits rejected at enqueue time
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Visits the store refused to persist
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
