//! Outbound queue for compensating `reset` messages.
//!
//! Engines enqueue without waiting; a single worker publishes. Every outcome
//! is counted so a lost compensation shows up in [`Compensator::stats`] and
//! in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{publish_json, Publisher};
use crate::messages::ResetMsg;
use crate::saga::topics;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationStats {
    pub enqueued: u64,
    pub published: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl CompensationStats {
    /// Messages accepted but not yet published or failed.
    pub fn pending(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.published)
            .saturating_sub(self.failed)
    }
}

#[derive(Clone)]
pub struct Compensator {
    tx: mpsc::Sender<ResetMsg>,
    counters: Arc<Counters>,
}

impl Compensator {
    /// Starts the publishing worker. The worker exits once every clone of the
    /// returned `Compensator` is dropped and the queue is empty.
    pub fn spawn(publisher: Arc<dyn Publisher>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run(rx, publisher, counters.clone()));
        (Self { tx, counters }, worker)
    }

    /// Queues a reset for `order_id`. Never waits; returns false when the
    /// message had to be dropped.
    pub fn reset(&self, order_id: i64, reason: impl std::fmt::Display) -> bool {
        let msg = ResetMsg {
            order_id,
            err_msg: reason.to_string(),
        };

        match self.tx.try_send(msg) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(msg)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(order_id = msg.order_id, err_msg = %msg.err_msg, "compensation queue full, reset dropped");
                false
            }
            Err(TrySendError::Closed(msg)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(order_id = msg.order_id, err_msg = %msg.err_msg, "compensation worker gone, reset dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> CompensationStats {
        self.stats_handle().get()
    }

    /// Counter view that outlives the compensator without keeping the
    /// worker alive.
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle(self.counters.clone())
    }
}

#[derive(Clone)]
pub struct StatsHandle(Arc<Counters>);

impl StatsHandle {
    pub fn get(&self) -> CompensationStats {
        CompensationStats {
            enqueued: self.0.enqueued.load(Ordering::Relaxed),
            published: self.0.published.load(Ordering::Relaxed),
            failed: self.0.failed.load(Ordering::Relaxed),
            dropped: self.0.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<ResetMsg>,
    publisher: Arc<dyn Publisher>,
    counters: Arc<Counters>,
) {
    while let Some(msg) = rx.recv().await {
        match publish_json(publisher.as_ref(), topics::RESET, msg.order_id, &msg).await {
            Ok(()) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
                info!(order_id = msg.order_id, err_msg = %msg.err_msg, "reset sent");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(order_id = msg.order_id, error = %e, "send reset");
            }
        }
    }
}
