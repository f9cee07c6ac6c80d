//! Observability infrastructure: tracing and the Prometheus exporter.
//!
//! The daemon calls [`init`] once before starting any collector.

use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self, RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Check if OTLP tracing is enabled via environment variable.
/// Set VIGIL_OTLP_ENABLED=1 or OTEL_EXPORTER_OTLP_ENDPOINT to enable.
fn otlp_enabled() -> bool {
    std::env::var("VIGIL_OTLP_ENABLED").is_ok()
        || std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
}

/// Get the OTLP endpoint (default: http://localhost:4317)
fn otlp_endpoint() -> String {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string())
}

/// Build the log filter: `RUST_LOG` wins, `default_level` otherwise.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing and the Prometheus `/metrics` listener on `metrics_port`.
///
/// Must be called once at startup; a second call fails because the global
/// subscriber and recorder are already installed.
pub fn init(log_level: &str, metrics_port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true));

    if otlp_enabled() {
        let endpoint = otlp_endpoint();

        let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(&endpoint);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(
                trace::config()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_id_generator(RandomIdGenerator::default())
                    .with_resource(Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "vigild"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
        subscriber.with(telemetry).init();
        tracing::info!(endpoint = %endpoint, "Observability initialized with OTLP tracing");
    } else {
        subscriber.init();
        tracing::info!("Observability initialized (OTLP disabled)");
    }

    PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], metrics_port)).install()?;

    metrics::register_core_metrics();
    metrics::set_version_info();

    Ok(())
}

/// Flush and shut down tracing exporters.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
