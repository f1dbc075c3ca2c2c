//! Prometheus series recorded by the lifecycle loops.
//!
//! Recording is a no-op until a recorder is installed, so tests need no setup.

use lifecycle_core::types::ResourceKind;

/// What caused a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupSource {
    /// Proactive per-kind TTL loop.
    TtlSweep,
    /// A task drained from the scheduler.
    Queue,
    /// Operator-triggered cleanup.
    Manual,
}

impl CleanupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupSource::TtlSweep => "ttl_sweep",
            CleanupSource::Queue => "queue",
            CleanupSource::Manual => "manual",
        }
    }
}

/// Outcome label for a dedup lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DedupOutcome {
    Hit,
    Miss,
    FailOpen,
}

impl DedupOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            DedupOutcome::Hit => "hit",
            DedupOutcome::Miss => "miss",
            DedupOutcome::FailOpen => "fail_open",
        }
    }
}

pub(crate) fn record_deleted(kind: ResourceKind, source: CleanupSource, count: u64) {
    if count == 0 {
        return;
    }
    metrics::counter!(
        "lifecycle_deleted_items_total",
        "kind" => kind.as_str(),
        "source" => source.as_str()
    )
    .increment(count);
}

pub(crate) fn record_failure(kind: ResourceKind, source: CleanupSource) {
    metrics::counter!(
        "lifecycle_cleanup_failures_total",
        "kind" => kind.as_str(),
        "source" => source.as_str()
    )
    .increment(1);
}

pub(crate) fn record_dedup(outcome: DedupOutcome) {
    metrics::counter!("lifecycle_dedup_lookups_total", "outcome" => outcome.as_str()).increment(1);
}

pub(crate) fn record_usage(kind: ResourceKind, ratio: f64) {
    metrics::gauge!("lifecycle_usage_ratio", "kind" => kind.as_str()).set(ratio);
}

pub(crate) fn record_queue_depth(depth: usize) {
    metrics::gauge!("lifecycle_queue_depth").set(depth as f64);
}
