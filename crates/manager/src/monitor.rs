//! Utilization sampling and reactive cleanup scheduling.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lifecycle_core::{
    config::{ResourceSettings, ResourcesConfig, Thresholds},
    traits::ResourceStoreAdapter,
    types::{CleanupTask, ResourceKind, ResourceMetrics, StoreSample},
    Result,
};

use crate::bounded;
use crate::instrumentation;
use crate::registry::AdapterRegistry;
use crate::scheduler::CleanupScheduler;

/// Samples every registered store and turns utilization into cleanup work.
pub struct UtilizationMonitor {
    adapters: Arc<AdapterRegistry>,
    resources: ResourcesConfig,
    thresholds: Thresholds,
    scheduler: Arc<CleanupScheduler>,
    timeout: Duration,
}

impl UtilizationMonitor {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        resources: ResourcesConfig,
        thresholds: Thresholds,
        scheduler: Arc<CleanupScheduler>,
        timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            resources,
            thresholds,
            scheduler,
            timeout,
        }
    }

    /// Measure every kind, then queue a sweep for each kind at `HIGH` or
    /// `CRITICAL` unless an equally urgent sweep is already pending.
    ///
    /// Kinds whose sampling fails are logged and left out of the result.
    pub async fn sample(&self) -> BTreeMap<ResourceKind, ResourceMetrics> {
        let metrics = self.measure().await;

        for m in metrics.values() {
            if !m.priority.requires_cleanup() {
                continue;
            }
            let task = CleanupTask::sweep(m.kind, m.priority, usage_reason(m.usage_percentage));
            if self.scheduler.enqueue_unless_pending(task) {
                tracing::info!(
                    kind = %m.kind,
                    priority = %m.priority,
                    usage = m.usage_percentage,
                    "Queued utilization cleanup"
                );
            }
        }

        metrics
    }

    /// Measure every kind without scheduling anything.
    ///
    /// Kinds are sampled concurrently, each bounded by the operation timeout,
    /// so one slow or failing store does not hold back the others.
    pub async fn measure(&self) -> BTreeMap<ResourceKind, ResourceMetrics> {
        let samples = join_all(
            self.adapters
                .iter()
                .map(|(kind, adapter)| async move { (kind, self.sample_store(adapter.as_ref()).await) }),
        )
        .await;

        let mut metrics = BTreeMap::new();
        for (kind, result) in samples {
            match result {
                Ok(sample) => {
                    let m = evaluate(kind, &sample, self.resources.get(kind), &self.thresholds);
                    instrumentation::record_usage(kind, m.usage_percentage);
                    metrics.insert(kind, m);
                }
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Sampling failed, kind omitted from metrics");
                }
            }
        }
        metrics
    }

    async fn sample_store(&self, adapter: &dyn ResourceStoreAdapter) -> Result<StoreSample> {
        bounded(self.timeout, "sample", adapter.sample()).await
    }
}

/// Utilization of one kind against its soft limit.
pub fn evaluate(
    kind: ResourceKind,
    sample: &StoreSample,
    settings: &ResourceSettings,
    thresholds: &Thresholds,
) -> ResourceMetrics {
    let observed = sample.observed(kind.limit_basis());
    let usage = observed as f64 / settings.soft_limit.max(1) as f64;

    ResourceMetrics {
        kind,
        total_items: sample.total_items,
        size_bytes: sample.size_bytes,
        usage_percentage: usage,
        priority: thresholds.classify(usage),
        oldest_item_age_seconds: sample.oldest_item_age_secs,
    }
}

/// Diagnostic attached to utilization-driven tasks, e.g. `usage 87.3%`.
pub fn usage_reason(usage: f64) -> String {
    format!("usage {:.1}%", usage * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_core::{mocks::FailingStore, types::CleanupPriority};
    use lifecycle_store::InMemoryResourceStore;

    fn settings(limit: u64) -> ResourceSettings {
        ResourceSettings::new(Duration::from_secs(3600), Duration::from_secs(3600), limit)
    }

    fn monitor_with(
        stores: Vec<Arc<dyn ResourceStoreAdapter>>,
        limit: u64,
    ) -> (UtilizationMonitor, Arc<CleanupScheduler>) {
        let mut registry = AdapterRegistry::new();
        for store in stores {
            registry.register(store);
        }
        let mut resources = ResourcesConfig::default();
        for kind in ResourceKind::ALL {
            *resources.get_mut(kind) = settings(limit);
        }
        let scheduler = Arc::new(CleanupScheduler::new());
        let monitor = UtilizationMonitor::new(
            Arc::new(registry),
            resources,
            Thresholds::default(),
            scheduler.clone(),
            Duration::from_secs(5),
        );
        (monitor, scheduler)
    }

    #[test]
    fn test_evaluate_uses_count_for_count_based_kinds() {
        let sample = StoreSample {
            total_items: 75,
            size_bytes: 10,
            oldest_item_age_secs: 7200,
        };
        let m = evaluate(ResourceKind::EphemeralCache, &sample, &settings(100), &Thresholds::default());

        assert_eq!(m.usage_percentage, 0.75);
        assert_eq!(m.priority, CleanupPriority::High);
        assert_eq!(m.oldest_age_hours(), 2.0);
    }

    #[test]
    fn test_evaluate_uses_bytes_for_blob_storage() {
        let sample = StoreSample {
            total_items: 1,
            size_bytes: 40,
            oldest_item_age_secs: 0,
        };
        let m = evaluate(ResourceKind::BlobStorage, &sample, &settings(100), &Thresholds::default());

        assert_eq!(m.usage_percentage, 0.4);
        assert_eq!(m.priority, CleanupPriority::Low);
    }

    #[test]
    fn test_usage_reason_format() {
        assert_eq!(usage_reason(0.873), "usage 87.3%");
        assert_eq!(usage_reason(0.9), "usage 90.0%");
    }

    #[tokio::test]
    async fn test_failing_kind_is_omitted() {
        let cache = Arc::new(InMemoryResourceStore::new(ResourceKind::EphemeralCache));
        cache.insert("seg", 10);
        let (monitor, _) = monitor_with(
            vec![cache, Arc::new(FailingStore::new(ResourceKind::VectorIndex))],
            100,
        );

        let metrics = monitor.sample().await;
        assert!(metrics.contains_key(&ResourceKind::EphemeralCache));
        assert!(!metrics.contains_key(&ResourceKind::VectorIndex));
        assert_eq!(metrics[&ResourceKind::EphemeralCache].total_items, 1);
    }

    #[tokio::test]
    async fn test_high_usage_enqueues_once() {
        let cache = Arc::new(InMemoryResourceStore::new(ResourceKind::EphemeralCache));
        for i in 0..80 {
            cache.insert(format!("seg-{}", i), 1);
        }
        let (monitor, scheduler) = monitor_with(vec![cache.clone()], 100);

        monitor.sample().await;
        monitor.sample().await;

        let queued = scheduler.snapshot();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].priority, CleanupPriority::High);
        assert_eq!(queued[0].reason, "usage 80.0%");
        assert!(queued[0].target.is_all());
    }

    #[tokio::test]
    async fn test_measure_never_enqueues() {
        let cache = Arc::new(InMemoryResourceStore::new(ResourceKind::EphemeralCache));
        for i in 0..95 {
            cache.insert(format!("seg-{}", i), 1);
        }
        let (monitor, scheduler) = monitor_with(vec![cache], 100);

        let metrics = monitor.measure().await;
        assert_eq!(metrics[&ResourceKind::EphemeralCache].priority, CleanupPriority::Critical);
        assert_eq!(scheduler.peek_size(), 0);
    }
}
