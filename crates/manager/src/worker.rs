//! Background loops: one TTL sweep per kind, the monitor, and the queue.
//!
//! All loops watch one shutdown channel. A loop checks it between ticks and
//! never abandons a tick halfway; shutdown waits a bounded grace period for
//! in-flight ticks and aborts whatever is still running after that.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::instrumentation::CleanupSource;
use crate::manager::LifecycleManager;

/// How a stopped worker ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Loops that exited within the grace period.
    pub completed: usize,
    /// Loops that were still busy and got aborted.
    pub aborted: usize,
}

/// Handle to the running loops.
pub struct CleanupWorker {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(String, JoinHandle<()>)>,
}

impl CleanupWorker {
    /// Start every loop on the current runtime.
    pub fn spawn(manager: Arc<LifecycleManager>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::new();

        for kind in manager.registered_kinds() {
            let m = Arc::clone(&manager);
            let name = format!("ttl_sweep:{}", kind);
            let period = manager.sweep_interval(kind);
            let rx = shutdown_rx.clone();

            let join = tokio::spawn(run_periodic(name.clone(), period, false, rx, move || {
                let m = Arc::clone(&m);
                async move {
                    if let Err(e) = m.sweep_kind(kind, CleanupSource::TtlSweep).await {
                        tracing::warn!(kind = %kind, error = %e, "TTL sweep failed, retrying next tick");
                    }
                }
            }));
            joins.push((name, join));
        }

        {
            let m = Arc::clone(&manager);
            let name = "monitor".to_string();
            let join = tokio::spawn(run_periodic(
                name.clone(),
                manager.monitor_interval(),
                true,
                shutdown_rx.clone(),
                move || {
                    let m = Arc::clone(&m);
                    async move {
                        m.run_monitor_cycle().await;
                    }
                },
            ));
            joins.push((name, join));
        }

        {
            let m = Arc::clone(&manager);
            let name = "queue".to_string();
            let join = tokio::spawn(run_periodic(
                name.clone(),
                manager.queue_process_interval(),
                false,
                shutdown_rx,
                move || {
                    let m = Arc::clone(&m);
                    async move {
                        m.process_queue().await;
                    }
                },
            ));
            joins.push((name, join));
        }

        tracing::info!(loops = joins.len(), "Cleanup worker started");
        Self { shutdown_tx, joins }
    }

    /// Ask every loop to stop after its current tick.
    pub fn request_shutdown(&self) {
        // Receivers may already be gone.
        let _ = self.shutdown_tx.send(true);
    }

    pub fn loop_count(&self) -> usize {
        self.joins.len()
    }

    /// Stop every loop, waiting up to `grace` in total for in-flight ticks.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        self.request_shutdown();

        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();

        for (name, mut join) in self.joins {
            match tokio::time::timeout_at(deadline, &mut join).await {
                Ok(Ok(())) => report.completed += 1,
                Ok(Err(e)) => {
                    // A panicked loop has nothing left in flight.
                    tracing::error!(name = %name, error = %e, "Cleanup loop ended abnormally");
                    report.completed += 1;
                }
                Err(_) => {
                    join.abort();
                    tracing::warn!(name = %name, "Cleanup loop still busy after grace period, aborted");
                    report.aborted += 1;
                }
            }
        }

        tracing::info!(completed = report.completed, aborted = report.aborted, "Cleanup worker stopped");
        report
    }
}

/// Call `tick` every `period` until shutdown. With `immediate` the first tick
/// fires at once; otherwise after one full period.
async fn run_periodic<F, Fut>(
    name: String,
    period: Duration,
    immediate: bool,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let start = if immediate { Instant::now() } else { Instant::now() + period };
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(name = %name, period = ?period, "Cleanup loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                // Sender dropped.
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        tick().await;
    }

    tracing::debug!(name = %name, "Cleanup loop stopped");
}
