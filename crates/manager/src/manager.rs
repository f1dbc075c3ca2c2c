//! The lifecycle facade used by ingestion and the operational surface.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lifecycle_core::{
    config::{LifecycleConfig, MonitorConfig, ResourcesConfig, TimeoutConfig},
    traits::{DedupCatalog, ResourceStoreAdapter},
    types::{CleanupTarget, CleanupTask, ContentHash, RegisterOutcome, ResourceKind, ResourceMetrics},
    Error, Result,
};

use crate::dedup::DeduplicationIndex;
use crate::instrumentation::{self, CleanupSource, DedupOutcome};
use crate::monitor::UtilizationMonitor;
use crate::registry::AdapterRegistry;
use crate::scheduler::CleanupScheduler;
use crate::sweep::{self, SweepReport};

// =============================================================================
// Ingestion-side types
// =============================================================================

/// Produces the derived artifact for novel content.
///
/// `create` only runs when no artifact exists yet for the owner and hash.
/// When a concurrent registration wins the catalog race, the artifact just
/// created is handed to `discard`.
#[async_trait]
pub trait ArtifactFactory: Send + Sync {
    /// Do the expensive work and return the new artifact id.
    async fn create(&self) -> Result<String>;

    /// Throw away an artifact that lost the registration race.
    async fn discard(&self, _artifact_id: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<F, Fut> ArtifactFactory for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    async fn create(&self) -> Result<String> {
        (self)().await
    }
}

/// Outcome of [`LifecycleManager::check_and_register`]. The contained id is
/// the canonical reference for the content either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The content was already known; no artifact was created.
    Existing(String),
    /// A new artifact was created and recorded.
    Created(String),
    /// A new artifact was created but the catalog could not record it.
    Unrecorded(String),
}

impl Registration {
    pub fn artifact_id(&self) -> &str {
        match self {
            Registration::Existing(id) | Registration::Created(id) | Registration::Unrecorded(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Registration::Existing(_))
    }
}

// =============================================================================
// Operational types
// =============================================================================

/// Per-kind result of a manual cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one queue-processing cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRunReport {
    pub processed: usize,
    pub failed: usize,
}

// =============================================================================
// LifecycleManager
// =============================================================================

type LaneKey = (String, ContentHash);

/// Owns the cleanup queue and the dedup write path; constructed once and
/// shared by `Arc`.
pub struct LifecycleManager {
    dedup: DeduplicationIndex,
    scheduler: Arc<CleanupScheduler>,
    monitor: UtilizationMonitor,
    adapters: Arc<AdapterRegistry>,
    resources: ResourcesConfig,
    monitor_config: MonitorConfig,
    timeouts: TimeoutConfig,
    /// In-process single-flight per `(owner, hash)`. Entries are removed once idle.
    lanes: DashMap<LaneKey, Arc<tokio::sync::Mutex<()>>>,
}

impl LifecycleManager {
    pub fn builder() -> LifecycleManagerBuilder {
        LifecycleManagerBuilder::new()
    }

    // -------------------------------------------------------------------------
    // Deduplication
    // -------------------------------------------------------------------------

    /// Return the existing artifact for this owner and content, or create one
    /// with `factory` and record it.
    ///
    /// Catalog failures fail open: ingestion proceeds as if nothing matched.
    /// Only an error from `factory.create` is returned.
    pub async fn check_and_register(
        &self,
        owner_id: &str,
        hash: &ContentHash,
        factory: &dyn ArtifactFactory,
    ) -> Result<Registration> {
        let key: LaneKey = (owner_id.to_string(), hash.clone());
        let lane = self.lanes.entry(key.clone()).or_default().clone();

        let guard = lane.clone().lock_owned().await;
        let result = self.register_exclusive(owner_id, hash, factory).await;
        drop(guard);
        drop(lane);

        // Only the map still holds the lane when nobody else is waiting on it.
        self.lanes.remove_if(&key, |_, lane| Arc::strong_count(lane) == 1);

        result
    }

    async fn register_exclusive(
        &self,
        owner_id: &str,
        hash: &ContentHash,
        factory: &dyn ArtifactFactory,
    ) -> Result<Registration> {
        match self.dedup.lookup(owner_id, hash).await {
            Ok(Some(artifact_id)) => {
                instrumentation::record_dedup(DedupOutcome::Hit);
                tracing::debug!(owner_id = %owner_id, hash = %hash, artifact_id = %artifact_id, "Duplicate content");
                return Ok(Registration::Existing(artifact_id));
            }
            Ok(None) => instrumentation::record_dedup(DedupOutcome::Miss),
            Err(e) => {
                instrumentation::record_dedup(DedupOutcome::FailOpen);
                tracing::warn!(owner_id = %owner_id, error = %e, "Dedup lookup failed, assuming no duplicate");
            }
        }

        let artifact_id = factory.create().await?;

        match self.dedup.register(owner_id, hash, &artifact_id).await {
            Ok(RegisterOutcome::Inserted(_)) => Ok(Registration::Created(artifact_id)),
            Ok(RegisterOutcome::Existing(winner)) => {
                tracing::info!(
                    owner_id = %owner_id,
                    winner = %winner.artifact_id,
                    loser = %artifact_id,
                    "Lost registration race, discarding new artifact"
                );
                if let Err(e) = factory.discard(&artifact_id).await {
                    tracing::warn!(artifact_id = %artifact_id, error = %e, "Failed to discard losing artifact");
                }
                Ok(Registration::Existing(winner.artifact_id))
            }
            Err(e) => {
                tracing::warn!(
                    owner_id = %owner_id,
                    artifact_id = %artifact_id,
                    error = %e,
                    "Dedup registration failed, artifact left unrecorded"
                );
                Ok(Registration::Unrecorded(artifact_id))
            }
        }
    }

    /// Drop the dedup records of an artifact deleted outside the sweeps.
    pub async fn forget_artifact(&self, artifact_id: &str) -> Result<usize> {
        let removed = self.dedup.forget_artifact(artifact_id).await?;
        tracing::debug!(artifact_id = %artifact_id, removed, "Forgot artifact");
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Utilization
    // -------------------------------------------------------------------------

    /// Current utilization of every reachable kind. Read-only: nothing is queued.
    pub async fn get_metrics(&self) -> BTreeMap<ResourceKind, ResourceMetrics> {
        self.monitor.measure().await
    }

    /// Sample every kind and queue reactive cleanup where needed.
    pub async fn run_monitor_cycle(&self) -> BTreeMap<ResourceKind, ResourceMetrics> {
        let metrics = self.monitor.sample().await;
        for m in metrics.values() {
            tracing::info!(
                kind = %m.kind,
                total_items = m.total_items,
                size_bytes = m.size_bytes,
                usage = m.usage_percentage,
                priority = %m.priority,
                "Utilization sample"
            );
        }
        metrics
    }

    // -------------------------------------------------------------------------
    // Cleanup
    // -------------------------------------------------------------------------

    /// Synchronous TTL sweep of one kind, or of every kind concurrently,
    /// bypassing the queue. Failures are reported per kind.
    pub async fn trigger_cleanup(&self, kind: Option<ResourceKind>) -> BTreeMap<ResourceKind, CleanupOutcome> {
        let kinds: Vec<ResourceKind> = match kind {
            Some(kind) => vec![kind],
            None => self.adapters.kinds().collect(),
        };

        let results = join_all(kinds.into_iter().map(|kind| async move {
            let outcome = match self.sweep_kind(kind, CleanupSource::Manual).await {
                Ok(report) => CleanupOutcome {
                    deleted: report.deleted,
                    error: None,
                },
                Err(e) => CleanupOutcome {
                    deleted: 0,
                    error: Some(e.to_string()),
                },
            };
            (kind, outcome)
        }))
        .await;

        results.into_iter().collect()
    }

    /// TTL sweep of one kind with its configured TTL.
    pub async fn sweep_kind(&self, kind: ResourceKind, source: CleanupSource) -> Result<SweepReport> {
        let adapter = self.adapter(kind)?;
        sweep::sweep_expired(
            adapter.as_ref(),
            self.resources.get(kind).ttl(),
            self.timeouts.operation(),
            source,
            self.cascade_for(kind),
        )
        .await
    }

    /// Queue cleanup work by hand. Single-id tasks are always queued; sweeps
    /// follow the same suppression rule as the monitor.
    pub fn schedule_cleanup(&self, task: CleanupTask) -> Result<bool> {
        self.adapter(task.resource_kind)?;
        if let CleanupTarget::Resource(id) = &task.target {
            if id.is_empty() {
                return Err(Error::invalid_request("targetId must not be empty"));
            }
        }

        let queued = if task.target.is_all() {
            self.scheduler.enqueue_unless_pending(task)
        } else {
            self.scheduler.enqueue(task);
            true
        };
        Ok(queued)
    }

    /// Drain up to `max_tasks_per_cycle` tasks and run each one. A failed task
    /// is logged and does not stop the rest.
    pub async fn process_queue(&self) -> QueueRunReport {
        let tasks = self.scheduler.drain(self.monitor_config.max_tasks_per_cycle);
        let mut report = QueueRunReport::default();

        for task in tasks {
            report.processed += 1;
            if let Err(e) = self.execute(&task).await {
                report.failed += 1;
                tracing::warn!(
                    task_id = %task.id,
                    kind = %task.resource_kind,
                    target = %task.target,
                    error = %e,
                    "Cleanup task failed"
                );
            }
        }

        if report.processed > 0 {
            tracing::info!(processed = report.processed, failed = report.failed, "Processed cleanup queue");
        }
        report
    }

    async fn execute(&self, task: &CleanupTask) -> Result<()> {
        match &task.target {
            CleanupTarget::All => self.sweep_kind(task.resource_kind, CleanupSource::Queue).await.map(|_| ()),
            CleanupTarget::Resource(id) => {
                let adapter = self.adapter(task.resource_kind)?;
                sweep::delete_one(
                    adapter.as_ref(),
                    id,
                    self.timeouts.operation(),
                    CleanupSource::Queue,
                    self.cascade_for(task.resource_kind),
                )
                .await
            }
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Pending tasks in the order they will run.
    pub fn queue_snapshot(&self) -> Vec<CleanupTask> {
        self.scheduler.snapshot()
    }

    pub fn queue_size(&self) -> usize {
        self.scheduler.peek_size()
    }

    pub fn registered_kinds(&self) -> Vec<ResourceKind> {
        self.adapters.kinds().collect()
    }

    pub fn sweep_interval(&self, kind: ResourceKind) -> Duration {
        self.resources.get(kind).sweep_interval()
    }

    pub fn monitor_interval(&self) -> Duration {
        self.monitor_config.interval()
    }

    pub fn queue_process_interval(&self) -> Duration {
        self.monitor_config.queue_process_interval()
    }

    fn adapter(&self, kind: ResourceKind) -> Result<&Arc<dyn ResourceStoreAdapter>> {
        self.adapters.require(kind)
    }

    /// Deleting an artifact drops its dedup records too.
    fn cascade_for(&self, kind: ResourceKind) -> Option<&DeduplicationIndex> {
        kind.holds_artifacts().then_some(&self.dedup)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for constructing a [`LifecycleManager`].
pub struct LifecycleManagerBuilder {
    config: LifecycleConfig,
    adapters: AdapterRegistry,
    catalog: Option<Arc<dyn DedupCatalog>>,
}

impl LifecycleManagerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: LifecycleConfig::default(),
            adapters: AdapterRegistry::new(),
            catalog: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Add the adapter for one resource kind.
    pub fn with_adapter(mut self, adapter: Arc<dyn ResourceStoreAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    /// Set the catalog behind the deduplication index.
    pub fn with_dedup_catalog(mut self, catalog: Arc<dyn DedupCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Validate the configuration and build the manager.
    pub fn build(self) -> Result<LifecycleManager> {
        self.config.validate()?;

        let catalog = self
            .catalog
            .ok_or_else(|| Error::configuration("a dedup catalog is required"))?;
        if self.adapters.is_empty() {
            return Err(Error::configuration("at least one resource adapter is required"));
        }

        let LifecycleConfig {
            monitor, timeouts, resources, ..
        } = self.config;

        let adapters = Arc::new(self.adapters);
        let scheduler = Arc::new(CleanupScheduler::new());
        let monitor_loop = UtilizationMonitor::new(
            adapters.clone(),
            resources.clone(),
            monitor.thresholds,
            scheduler.clone(),
            timeouts.operation(),
        );

        Ok(LifecycleManager {
            dedup: DeduplicationIndex::new(catalog, timeouts.operation()),
            scheduler,
            monitor: monitor_loop,
            adapters,
            resources,
            monitor_config: monitor,
            timeouts,
            lanes: DashMap::new(),
        })
    }
}

impl Default for LifecycleManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_core::{mocks::UnavailableCatalog, types::CleanupPriority};
    use lifecycle_store::{InMemoryDedupCatalog, InMemoryResourceStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        created: AtomicUsize,
        discarded: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ArtifactFactory for CountingFactory {
        async fn create(&self) -> Result<String> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("artifact-{}", n))
        }

        async fn discard(&self, _artifact_id: &str) -> Result<()> {
            self.discarded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager_with_catalog(catalog: Arc<dyn DedupCatalog>) -> (LifecycleManager, Arc<InMemoryResourceStore>) {
        let cache = Arc::new(InMemoryResourceStore::new(ResourceKind::EphemeralCache));
        let manager = LifecycleManager::builder()
            .with_adapter(cache.clone())
            .with_dedup_catalog(catalog)
            .build()
            .unwrap();
        (manager, cache)
    }

    #[tokio::test]
    async fn test_hit_skips_factory() {
        let (manager, _) = manager_with_catalog(Arc::new(InMemoryDedupCatalog::new()));
        let factory = CountingFactory::new();
        let hash = ContentHash::of(b"doc");

        let first = manager.check_and_register("u1", &hash, &factory).await.unwrap();
        let second = manager.check_and_register("u1", &hash, &factory).await.unwrap();

        assert_eq!(first, Registration::Created("artifact-0".into()));
        assert_eq!(second, Registration::Existing("artifact-0".into()));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert!(manager.lanes.is_empty());
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let (manager, _) = manager_with_catalog(Arc::new(InMemoryDedupCatalog::new()));
        let hash = ContentHash::of(b"doc");

        let factory = || async { Ok::<_, Error>("doc-42".to_string()) };
        let registration = manager.check_and_register("u1", &hash, &factory).await.unwrap();
        assert_eq!(registration.artifact_id(), "doc-42");
        assert!(!registration.is_duplicate());
    }

    #[tokio::test]
    async fn test_unavailable_catalog_fails_open() {
        let (manager, _) = manager_with_catalog(Arc::new(UnavailableCatalog::new()));
        let factory = CountingFactory::new();
        let hash = ContentHash::of(b"doc");

        let registration = manager.check_and_register("u1", &hash, &factory).await.unwrap();
        assert_eq!(registration, Registration::Unrecorded("artifact-0".into()));
    }

    #[tokio::test]
    async fn test_factory_error_propagates() {
        let (manager, _) = manager_with_catalog(Arc::new(InMemoryDedupCatalog::new()));
        let factory = || async { Err::<String, _>(Error::internal("extraction failed")) };

        let err = manager
            .check_and_register("u1", &ContentHash::of(b"doc"), &factory)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(manager.lanes.is_empty());
    }

    #[tokio::test]
    async fn test_loser_artifact_is_discarded() {
        let catalog = Arc::new(InMemoryDedupCatalog::new());
        let (manager, _) = manager_with_catalog(catalog.clone());
        let hash = ContentHash::of(b"doc");
        let factory = CountingFactory::new();

        // Another process registered between our lookup and our insert.
        struct RacingFactory<'a> {
            inner: &'a CountingFactory,
            catalog: Arc<InMemoryDedupCatalog>,
            hash: ContentHash,
        }

        #[async_trait]
        impl ArtifactFactory for RacingFactory<'_> {
            async fn create(&self) -> Result<String> {
                self.catalog
                    .insert_if_absent(lifecycle_core::types::DedupRecord::new("u1", self.hash.clone(), "winner"))
                    .await?;
                self.inner.create().await
            }

            async fn discard(&self, artifact_id: &str) -> Result<()> {
                self.inner.discard(artifact_id).await
            }
        }

        let racing = RacingFactory {
            inner: &factory,
            catalog,
            hash: hash.clone(),
        };
        let registration = manager.check_and_register("u1", &hash, &racing).await.unwrap();

        assert_eq!(registration, Registration::Existing("winner".into()));
        assert_eq!(factory.discarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_cleanup_reports_unknown_kind() {
        let (manager, cache) = manager_with_catalog(Arc::new(InMemoryDedupCatalog::new()));
        cache.insert_with_age("old", 1, Duration::from_secs(2 * 3600));

        let all = manager.trigger_cleanup(None).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[&ResourceKind::EphemeralCache].deleted, 1);

        let missing = manager.trigger_cleanup(Some(ResourceKind::BlobStorage)).await;
        assert!(!missing[&ResourceKind::BlobStorage].is_success());
    }

    #[tokio::test]
    async fn test_schedule_and_process_targeted_task() {
        let (manager, cache) = manager_with_catalog(Arc::new(InMemoryDedupCatalog::new()));
        cache.insert("seg-1", 1);

        let task = CleanupTask::targeted(ResourceKind::EphemeralCache, "seg-1", CleanupPriority::High, "manual");
        assert!(manager.schedule_cleanup(task.clone()).unwrap());
        // Targeted tasks are never suppressed.
        assert!(manager.schedule_cleanup(task).unwrap());
        assert_eq!(manager.queue_size(), 2);

        let report = manager.process_queue().await;
        assert_eq!(report, QueueRunReport { processed: 2, failed: 0 });
        assert!(!cache.contains("seg-1"));
    }

    #[tokio::test]
    async fn test_schedule_rejects_unregistered_kind() {
        let (manager, _) = manager_with_catalog(Arc::new(InMemoryDedupCatalog::new()));
        let task = CleanupTask::sweep(ResourceKind::VectorIndex, CleanupPriority::High, "manual");
        assert!(manager.schedule_cleanup(task).is_err());
    }

    #[test]
    fn test_build_requires_catalog() {
        let result = LifecycleManager::builder()
            .with_adapter(Arc::new(InMemoryResourceStore::new(ResourceKind::EphemeralCache)))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_build_rejects_invalid_thresholds() {
        let mut config = LifecycleConfig::default();
        config.monitor.thresholds.high = 0.4;

        let result = LifecycleManager::builder()
            .with_config(config)
            .with_adapter(Arc::new(InMemoryResourceStore::new(ResourceKind::EphemeralCache)))
            .with_dedup_catalog(Arc::new(InMemoryDedupCatalog::new()))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
