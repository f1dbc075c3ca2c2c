//! Structured logging and optional OpenTelemetry export.

use lifecycle_core::{config::TelemetryConfig, Error, Result};
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,lifecycle=debug";

/// Install the global subscriber: env filter, fmt (or JSON) output, and an
/// OTLP exporter when an endpoint is configured.
///
/// `OTEL_EXPORTER_OTLP_ENDPOINT` wins over `telemetry.otlp_endpoint`.
pub fn configure_tracing(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer().json().with_current_span(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .or_else(|| config.otlp_endpoint.clone());

    if let Some(endpoint) = endpoint {
        let provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint.clone()))
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )])))
            .install_batch(runtime::Tokio)
            .map_err(|e| Error::configuration(format!("Failed to install OTLP pipeline: {}", e)))?;

        let tracer = provider.tracer(config.service_name.clone());
        opentelemetry::global::set_tracer_provider(provider);

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()
            .map_err(|e| Error::configuration(format!("Failed to install subscriber: {}", e)))?;

        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");
    } else {
        registry
            .try_init()
            .map_err(|e| Error::configuration(format!("Failed to install subscriber: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_otlp_subscriber_installs_once() {
        let config = TelemetryConfig {
            otlp_endpoint: Some("http://127.0.0.1:4317".into()),
            ..TelemetryConfig::default()
        };

        configure_tracing(&config).unwrap();
        tracing::info!("exported span target");

        let err = configure_tracing(&config).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
