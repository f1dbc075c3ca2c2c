//! Process configuration.
//!
//! Loaded once at startup; any invalid value is a fatal `Error::Configuration`.

use config::{Config, Environment, File, FileFormat};
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{CleanupPriority, ResourceKind};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LifecycleConfig {
    pub server: ServerConfig,
    pub monitor: MonitorConfig,
    pub timeouts: TimeoutConfig,
    pub resources: ResourcesConfig,
    pub backends: BackendsConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8088,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub queue_process_interval_secs: u64,
    pub max_tasks_per_cycle: usize,
    pub thresholds: Thresholds,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn queue_process_interval(&self) -> Duration {
        Duration::from_secs(self.queue_process_interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            queue_process_interval_secs: 30 * 60,
            max_tasks_per_cycle: 5,
            thresholds: Thresholds::default(),
        }
    }
}

/// Lower bounds (inclusive) of each utilization tier.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Thresholds {
    /// Step function from a utilization ratio to a priority tier.
    pub fn classify(&self, usage: f64) -> CleanupPriority {
        if usage >= self.critical {
            CleanupPriority::Critical
        } else if usage >= self.high {
            CleanupPriority::High
        } else if usage >= self.medium {
            CleanupPriority::Medium
        } else {
            CleanupPriority::Low
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [("medium", self.medium), ("high", self.high), ("critical", self.critical)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::configuration(format!(
                    "threshold {} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(self.medium < self.high && self.high < self.critical) {
            return Err(Error::configuration(format!(
                "thresholds must be strictly increasing (medium {} < high {} < critical {})",
                self.medium, self.high, self.critical
            )));
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            medium: 0.5,
            high: 0.75,
            critical: 0.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound applied to every adapter and catalog call.
    pub operation_ms: u64,
    /// How long shutdown waits for in-flight deletions.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn operation(&self) -> Duration {
        Duration::from_millis(self.operation_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            operation_ms: 10_000,
            shutdown_grace_secs: 30,
        }
    }
}

/// Per-kind retention settings.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSettings {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Items for count-based kinds, bytes for size-based kinds.
    pub soft_limit: u64,
}

impl ResourceSettings {
    pub fn new(ttl: Duration, sweep_interval: Duration, soft_limit: u64) -> Self {
        Self {
            ttl_secs: ttl.as_secs(),
            sweep_interval_secs: sweep_interval.as_secs(),
            soft_limit,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResourcesConfig {
    pub ephemeral_cache: ResourceSettings,
    pub vector_index: ResourceSettings,
    pub blob_storage: ResourceSettings,
    pub metadata_catalog: ResourceSettings,
}

impl ResourcesConfig {
    pub fn get(&self, kind: ResourceKind) -> &ResourceSettings {
        match kind {
            ResourceKind::EphemeralCache => &self.ephemeral_cache,
            ResourceKind::VectorIndex => &self.vector_index,
            ResourceKind::BlobStorage => &self.blob_storage,
            ResourceKind::MetadataCatalog => &self.metadata_catalog,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut ResourceSettings {
        match kind {
            ResourceKind::EphemeralCache => &mut self.ephemeral_cache,
            ResourceKind::VectorIndex => &mut self.vector_index,
            ResourceKind::BlobStorage => &mut self.blob_storage,
            ResourceKind::MetadataCatalog => &mut self.metadata_catalog,
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        const HOUR: u64 = 60 * 60;
        const DAY: u64 = 24 * HOUR;
        Self {
            ephemeral_cache: ResourceSettings {
                ttl_secs: HOUR,
                sweep_interval_secs: HOUR,
                soft_limit: 10_000,
            },
            vector_index: ResourceSettings {
                ttl_secs: 7 * DAY,
                sweep_interval_secs: 6 * HOUR,
                soft_limit: 100_000,
            },
            blob_storage: ResourceSettings {
                ttl_secs: 30 * DAY,
                sweep_interval_secs: DAY,
                soft_limit: 10 * 1024 * 1024 * 1024, // 10GiB
            },
            metadata_catalog: ResourceSettings {
                ttl_secs: 90 * DAY,
                sweep_interval_secs: DAY,
                soft_limit: 1_000_000,
            },
        }
    }
}

/// Connection settings. An unset backend falls back to the in-memory adapter.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendsConfig {
    pub redis_url: Option<Secret<String>>,
    pub redis_prefix: String,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
    pub vector_size: u64,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub s3_endpoint: Option<String>,
    pub sqlite_path: Option<String>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_prefix: "lifecycle:cache".into(),
            qdrant_url: None,
            qdrant_collection: "lifecycle_embeddings".into(),
            vector_size: 1536,
            s3_bucket: None,
            s3_prefix: "artifacts".into(),
            s3_endpoint: None,
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            service_name: "resource-lifecycle".into(),
            otlp_endpoint: None,
        }
    }
}

impl LifecycleConfig {
    /// Load from `config/default`, `config/{LIFECYCLE_ENV}`, `config/local`
    /// and `LIFECYCLE__*` environment variables, then validate.
    pub fn load() -> Result<Self> {
        let env = std::env::var("LIFECYCLE_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map LIFECYCLE__SERVER__PORT=9000 to server.port
            .add_source(
                Environment::with_prefix("LIFECYCLE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an inline TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the loops misbehave.
    pub fn validate(&self) -> Result<()> {
        self.monitor.thresholds.validate()?;

        check_secs("monitor.interval_secs", self.monitor.interval_secs)?;
        check_secs("monitor.queue_process_interval_secs", self.monitor.queue_process_interval_secs)?;
        if self.monitor.max_tasks_per_cycle == 0 {
            return Err(Error::configuration("max_tasks_per_cycle must be greater than zero"));
        }
        if self.timeouts.operation_ms == 0 {
            return Err(Error::configuration("timeouts.operation_ms must be greater than zero"));
        }
        if self.timeouts.operation_ms / 1000 > MAX_DURATION_SECS {
            return Err(Error::configuration("timeouts.operation_ms is too large"));
        }
        if self.timeouts.shutdown_grace_secs > MAX_DURATION_SECS {
            return Err(Error::configuration("timeouts.shutdown_grace_secs is too large"));
        }

        for kind in ResourceKind::ALL {
            let settings = self.resources.get(kind);
            check_secs(&format!("resources.{}.ttl_secs", kind), settings.ttl_secs)?;
            check_secs(&format!("resources.{}.sweep_interval_secs", kind), settings.sweep_interval_secs)?;
            if settings.soft_limit == 0 {
                return Err(Error::configuration(format!("resources.{}.soft_limit must be greater than zero", kind)));
            }
        }

        Ok(())
    }
}

/// Upper bound for every configured duration: ten years.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn check_secs(name: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::configuration(format!("{} must be greater than zero", name)));
    }
    if secs > MAX_DURATION_SECS {
        return Err(Error::configuration(format!(
            "{} must not exceed {} seconds",
            name, MAX_DURATION_SECS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LifecycleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.monitor.max_tasks_per_cycle, 5);
        assert_eq!(config.monitor.interval(), Duration::from_secs(1800));
        assert_eq!(config.monitor.queue_process_interval(), Duration::from_secs(1800));
    }

    #[test]
    fn test_threshold_step_function() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0.0), CleanupPriority::Low);
        assert_eq!(t.classify(0.49), CleanupPriority::Low);
        assert_eq!(t.classify(0.5), CleanupPriority::Medium);
        assert_eq!(t.classify(0.749999), CleanupPriority::Medium);
        assert_eq!(t.classify(0.75), CleanupPriority::High);
        assert_eq!(t.classify(0.899), CleanupPriority::High);
        assert_eq!(t.classify(0.9), CleanupPriority::Critical);
        assert_eq!(t.classify(1.7), CleanupPriority::Critical);
    }

    #[test]
    fn test_from_toml_overrides_one_kind() {
        let config = LifecycleConfig::from_toml(
            r#"
            [monitor]
            max_tasks_per_cycle = 2

            [resources.ephemeral_cache]
            ttl_secs = 60
            sweep_interval_secs = 30
            soft_limit = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.max_tasks_per_cycle, 2);
        assert_eq!(config.resources.get(ResourceKind::EphemeralCache).soft_limit, 100);
        assert_eq!(config.resources.get(ResourceKind::EphemeralCache).ttl(), Duration::from_secs(60));
        // Untouched kinds keep their defaults.
        assert_eq!(config.resources.get(ResourceKind::VectorIndex).soft_limit, 100_000);
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let mut config = LifecycleConfig::default();
        config.monitor.thresholds.high = 0.95;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = LifecycleConfig::default();
        config.monitor.thresholds.critical = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut config = LifecycleConfig::default();
        config.resources.get_mut(ResourceKind::BlobStorage).ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("blob_storage"));
    }

    #[test]
    fn test_rejects_zero_tasks_per_cycle() {
        let mut config = LifecycleConfig::default();
        config.monitor.max_tasks_per_cycle = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_ttl_beyond_ten_years() {
        let mut config = LifecycleConfig::default();
        config.resources.get_mut(ResourceKind::MetadataCatalog).ttl_secs = u64::MAX / 1000;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("metadata_catalog.ttl_secs"));

        config.resources.get_mut(ResourceKind::MetadataCatalog).ttl_secs = MAX_DURATION_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_huge_intervals() {
        let mut config = LifecycleConfig::default();
        config.resources.get_mut(ResourceKind::VectorIndex).sweep_interval_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = LifecycleConfig::default();
        config.monitor.queue_process_interval_secs = u64::MAX;
        assert!(config.validate().is_err());
    }
}
