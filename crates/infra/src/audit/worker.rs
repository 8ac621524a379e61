use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::entry::AuditJob;
use crate::store::AuditStore;

/// Default bound of the in-process audit queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Audit pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub recorded: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AuditStats {
        AuditStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Request-path side of the audit pipeline. Never blocks, never fails.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditJob>,
    counters: Arc<Counters>,
}

impl AuditRecorder {
    /// Hand a job to the worker. A full queue or a stopped worker drops it.
    pub fn record(&self, job: AuditJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "audit", user_id = %job.actor.user_id, url = %job.url, "audit queue full; entry dropped");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "audit", user_id = %job.actor.user_id, url = %job.url, "audit worker stopped; entry dropped");
            }
        }
    }

    pub fn stats(&self) -> AuditStats {
        self.counters.snapshot()
    }
}

/// Handle to stop and join the audit worker.
#[derive(Debug)]
pub struct AuditWorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl AuditWorkerHandle {
    /// Stop accepting jobs, write what is already queued, then return.
    pub async fn shutdown(self) -> AuditStats {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            error!(target: "audit", error = %err, "audit worker panicked");
        }
        self.counters.snapshot()
    }

    pub fn stats(&self) -> AuditStats {
        self.counters.snapshot()
    }
}

/// Background writer draining the audit queue into an [`AuditStore`].
///
/// - At most once: a failed write is logged and not retried
/// - Must be spawned from within a Tokio runtime
#[derive(Debug)]
pub struct AuditWorker;

impl AuditWorker {
    pub fn spawn(store: Arc<dyn AuditStore>, capacity: usize) -> (AuditRecorder, AuditWorkerHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());

        let join = tokio::spawn(worker_loop(store, rx, shutdown_rx, counters.clone()));

        (
            AuditRecorder {
                tx,
                counters: counters.clone(),
            },
            AuditWorkerHandle {
                shutdown: shutdown_tx,
                join,
                counters,
            },
        )
    }
}

async fn worker_loop(
    store: Arc<dyn AuditStore>,
    mut rx: mpsc::Receiver<AuditJob>,
    mut shutdown_rx: oneshot::Receiver<()>,
    counters: Arc<Counters>,
) {
    loop {
        tokio::select! {
            biased;
            job = rx.recv() => match job {
                Some(job) => write(store.as_ref(), job, &counters).await,
                None => break,
            },
            _ = &mut shutdown_rx => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    write(store.as_ref(), job, &counters).await;
                }
                break;
            }
        }
    }
    debug!(target: "audit", "audit worker stopped");
}

async fn write(store: &dyn AuditStore, job: AuditJob, counters: &Counters) {
    let record = job.into_record();
    let (user_id, action) = (record.user_id, record.action.clone());

    match store.append(record).await {
        Ok(id) => {
            counters.recorded.fetch_add(1, Ordering::Relaxed);
            debug!(target: "audit", audit_id = %id, user_id = %user_id, action = %action, "audit entry recorded");
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(target: "audit", user_id = %user_id, action = %action, error = %err, "audit logging failed");
        }
    }
}
