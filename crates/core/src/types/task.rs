//! Cleanup work items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::types::ResourceKind;

/// Sentinel target meaning "sweep this kind using its TTL rule".
pub const SWEEP_ALL: &str = "all";

/// Urgency of a cleanup task. Lower rank is more urgent, and the derived
/// ordering follows rank: `Critical < High < Medium < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupPriority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl CleanupPriority {
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPriority::Critical => "CRITICAL",
            CleanupPriority::High => "HIGH",
            CleanupPriority::Medium => "MEDIUM",
            CleanupPriority::Low => "LOW",
        }
    }

    /// Whether utilization at this level should produce reactive cleanup work.
    pub fn requires_cleanup(&self) -> bool {
        matches!(self, CleanupPriority::Critical | CleanupPriority::High)
    }

    /// `true` when `self` is equally or more urgent than `other`.
    pub fn at_least_as_urgent_as(&self, other: CleanupPriority) -> bool {
        *self <= other
    }
}

impl fmt::Display for CleanupPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(CleanupPriority::Critical),
            "HIGH" => Ok(CleanupPriority::High),
            "MEDIUM" => Ok(CleanupPriority::Medium),
            "LOW" => Ok(CleanupPriority::Low),
            other => Err(Error::invalid_request(format!("unknown priority: {}", other))),
        }
    }
}

/// What a task deletes: a single resource id, or a TTL sweep of the whole kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CleanupTarget {
    All,
    Resource(String),
}

impl CleanupTarget {
    pub fn is_all(&self) -> bool {
        matches!(self, CleanupTarget::All)
    }
}

impl From<String> for CleanupTarget {
    fn from(value: String) -> Self {
        if value == SWEEP_ALL {
            CleanupTarget::All
        } else {
            CleanupTarget::Resource(value)
        }
    }
}

impl From<CleanupTarget> for String {
    fn from(target: CleanupTarget) -> Self {
        match target {
            CleanupTarget::All => SWEEP_ALL.to_string(),
            CleanupTarget::Resource(id) => id,
        }
    }
}

impl fmt::Display for CleanupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupTarget::All => f.write_str(SWEEP_ALL),
            CleanupTarget::Resource(id) => f.write_str(id),
        }
    }
}

/// A pending unit of cleanup work. Lives only in process memory; lost tasks
/// are regenerated by the monitor and the sweep timers on their next cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupTask {
    pub id: Uuid,
    pub priority: CleanupPriority,
    pub resource_kind: ResourceKind,
    #[serde(rename = "targetId")]
    pub target: CleanupTarget,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

impl CleanupTask {
    /// Task that sweeps a whole kind with its TTL rule.
    pub fn sweep(kind: ResourceKind, priority: CleanupPriority, reason: impl Into<String>) -> Self {
        Self::new(kind, CleanupTarget::All, priority, reason)
    }

    /// Task that deletes one resource.
    pub fn targeted(
        kind: ResourceKind,
        resource_id: impl Into<String>,
        priority: CleanupPriority,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(kind, CleanupTarget::Resource(resource_id.into()), priority, reason)
    }

    pub fn new(
        kind: ResourceKind,
        target: CleanupTarget,
        priority: CleanupPriority,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            resource_kind: kind,
            target,
            created_at: Utc::now(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_follows_rank() {
        let mut levels = vec![
            CleanupPriority::Low,
            CleanupPriority::Critical,
            CleanupPriority::Medium,
            CleanupPriority::High,
        ];
        levels.sort();
        assert_eq!(
            levels,
            vec![
                CleanupPriority::Critical,
                CleanupPriority::High,
                CleanupPriority::Medium,
                CleanupPriority::Low,
            ]
        );
        assert_eq!(CleanupPriority::Critical.rank(), 1);
        assert_eq!(CleanupPriority::Low.rank(), 4);
    }

    #[test]
    fn test_urgency_comparison() {
        assert!(CleanupPriority::Critical.at_least_as_urgent_as(CleanupPriority::High));
        assert!(CleanupPriority::High.at_least_as_urgent_as(CleanupPriority::High));
        assert!(!CleanupPriority::Medium.at_least_as_urgent_as(CleanupPriority::High));
        assert!(CleanupPriority::High.requires_cleanup());
        assert!(!CleanupPriority::Medium.requires_cleanup());
    }

    #[test]
    fn test_task_payload_shape() {
        let task = CleanupTask::sweep(ResourceKind::EphemeralCache, CleanupPriority::High, "usage 80.0%");
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["priority"], "HIGH");
        assert_eq!(value["resourceKind"], "ephemeral_cache");
        assert_eq!(value["targetId"], "all");
        assert_eq!(value["reason"], "usage 80.0%");
        assert!(value["createdAt"].is_string());

        let back: CleanupTask = serde_json::from_value(value).unwrap();
        assert!(back.target.is_all());
    }

    #[test]
    fn test_targeted_task_keeps_id() {
        let task = CleanupTask::targeted(ResourceKind::BlobStorage, "doc-7", CleanupPriority::Low, "manual");
        assert_eq!(task.target, CleanupTarget::Resource("doc-7".into()));
        assert_eq!(task.target.to_string(), "doc-7");
    }
}
