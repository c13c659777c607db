//! Bounded work queue and worker pool.
//!
//! The webhook handler must answer inside Slack's response budget, so
//! admitted events are pushed onto a bounded queue and processed by a fixed
//! pool of workers. When the queue is full the event is rejected instead of
//! piling up unbounded work.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::dispatcher::Dispatcher;
use crate::event::InboundEvent;

#[derive(Debug, Error)]
#[error("worker queue is full")]
pub struct QueueFull;

/// Handle for enqueueing events without blocking the request path.
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<InboundEvent>,
}

impl JobSender {
    pub fn enqueue(&self, event: InboundEvent) -> Result<(), QueueFull> {
        self.tx.try_send(event).map_err(|_| QueueFull)
    }
}

/// Create the bounded job queue.
pub fn channel(capacity: usize) -> (JobSender, mpsc::Receiver<InboundEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobSender { tx }, rx)
}

/// Spawn `size` workers draining the queue into the dispatcher. Workers exit
/// when every `JobSender` clone has been dropped.
pub fn spawn_pool(
    size: usize,
    dispatcher: Arc<Dispatcher>,
    rx: mpsc::Receiver<InboundEvent>,
) -> JoinSet<()> {
    let rx = Arc::new(Mutex::new(rx));
    let mut pool = JoinSet::new();
    for worker_id in 0..size.max(1) {
        let rx = Arc::clone(&rx);
        let dispatcher = Arc::clone(&dispatcher);
        pool.spawn(async move {
            loop {
                let job = rx.lock().await.recv().await;
                match job {
                    Some(event) => dispatcher.handle(event).await,
                    None => break,
                }
            }
            tracing::debug!(worker_id, "worker exiting, queue closed");
        });
    }
    pool
}

/// Wait for in-flight workers to finish, up to `timeout`.
pub async fn drain(mut pool: JoinSet<()>, timeout: Duration) {
    if pool.is_empty() {
        return;
    }
    let drained = tokio::time::timeout(timeout, async {
        while pool.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(?timeout, "workers did not drain in time, aborting");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
