//! Tracing subscriber setup with optional OTLP export.
//!
//! Logs always go to stdout through the `fmt` layer, filtered by `RUST_LOG`
//! (default `info`). With `[telemetry] enabled = true` the same spans are also
//! exported to an OpenTelemetry collector.

use std::time::Duration;

use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Sampler, SdkTracerProvider};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::TelemetryConfig;

/// Keeps the tracer provider alive. Call [`TelemetryGuard::shutdown`] to
/// flush pending spans before exit.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "tracer provider shutdown failed");
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_fmt_only() -> TelemetryGuard {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
    TelemetryGuard { provider: None }
}

/// Install the global subscriber.
///
/// An exporter that fails to build does not stop the server: it falls back to
/// stdout logging and reports the error.
pub fn init(config: &TelemetryConfig) -> TelemetryGuard {
    if !config.enabled {
        return init_fmt_only();
    }

    let exporter = match build_exporter(config) {
        Ok(exporter) => exporter,
        Err(e) => {
            let guard = init_fmt_only();
            tracing::error!(
                error = %e,
                endpoint = %config.endpoint,
                "failed to build OTLP exporter, tracing to stdout only"
            );
            return guard;
        }
    };

    let mut attributes = vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ];
    attributes.extend(
        config
            .resource_attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
    );

    let provider = SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_sampler(sampler(config.sample_ratio))
        .with_resource(Resource::builder().with_attributes(attributes).build())
        .build();
    global::set_tracer_provider(provider.clone());

    let otel_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("tollgate"));
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    info!(
        endpoint = %config.endpoint,
        protocol = %config.protocol,
        sample_ratio = config.sample_ratio,
        "OpenTelemetry tracing enabled"
    );

    TelemetryGuard {
        provider: Some(provider),
    }
}

fn sampler(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}

fn build_exporter(
    config: &TelemetryConfig,
) -> Result<opentelemetry_otlp::SpanExporter, opentelemetry::trace::TraceError> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    let builder = opentelemetry_otlp::SpanExporter::builder();

    if config.protocol == "http" {
        builder
            .with_http()
            .with_endpoint(&config.endpoint)
            .with_timeout(timeout)
            .build()
    } else {
        if config.protocol != "grpc" {
            tracing::warn!(protocol = %config.protocol, "unknown telemetry protocol, using gRPC");
        }
        builder
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .with_timeout(timeout)
            .build()
    }
}
