#![deny(unused)]
//! Lifecycle orchestration: deduplication, utilization monitoring, the
//! cleanup queue and the background loops that drain it.
//!
//! [`LifecycleManager`] is constructed once at startup and shared by handle
//! with the HTTP surface and the ingestion path; [`CleanupWorker`] runs the
//! loops against it.

pub mod dedup;
pub mod instrumentation;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod sweep;
pub mod worker;

use std::future::Future;
use std::time::Duration;

use lifecycle_core::{Error, Result};

pub use dedup::DeduplicationIndex;
pub use instrumentation::CleanupSource;
pub use manager::{ArtifactFactory, CleanupOutcome, LifecycleManager, LifecycleManagerBuilder, QueueRunReport, Registration};
pub use monitor::UtilizationMonitor;
pub use registry::AdapterRegistry;
pub use scheduler::CleanupScheduler;
pub use sweep::SweepReport;
pub use worker::{CleanupWorker, ShutdownReport};

/// Run `fut` with an upper bound; running out of time is `Error::TimedOut`.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timed_out(format!("{} exceeded {:?}", what, limit))),
    }
}
