//! OpenTelemetry bootstrap for applications embedding the client
//!
//! The client crates only emit `tracing` events and record metrics through the
//! global OpenTelemetry providers. Nothing leaves the process until the host
//! calls [`init_observability`], usually once from `main`, and
//! [`shutdown_observability`] before exiting so the last batches are flushed:
//!
//! ```rust,no_run
//! use triggerware_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("tweet-monitor")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("triggerware_rpc=debug,info");
//!
//!     triggerware_core::init_observability(config).expect("observability");
//!     // ... connect and run queries ...
//!     triggerware_core::shutdown_observability();
//! }
//! ```
//!
//! `OTEL_EXPORTER_OTLP_ENDPOINT` overrides the collector and `RUST_LOG` the
//! log filter.

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::{Sampler, SdkTracerProvider, Tracer},
    Resource,
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Providers installed by `init_observability`, kept for the flush on shutdown
static INSTALLED: Mutex<Option<Installed>> = Mutex::new(None);

struct Installed {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
}

/// What to export and where
///
/// Unless overridden: service `"triggerware"` at this crate's version,
/// endpoint from `OTEL_EXPORTER_OTLP_ENDPOINT` or `http://localhost:4317`,
/// traces, metrics and logs all on, filter from `RUST_LOG` or `"info"`.
///
/// ```rust
/// use triggerware_core::ObservabilityConfig;
///
/// let config = ObservabilityConfig::new("reldata-browser")
///     .with_metrics(false)
///     .with_version("0.3.1");
/// assert!(!config.enable_metrics);
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub service_version: String,
    /// OTLP/gRPC collector
    pub otlp_endpoint: String,
    pub enable_traces: bool,
    /// Global meter provider, which is what `ClientMetrics` records into
    pub enable_metrics: bool,
    /// JSON log lines on stdout
    pub enable_logs: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "triggerware".into(),
            service_version: env!("CARGO_PKG_VERSION").into(),
            otlp_endpoint: env_or("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_ENDPOINT),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: env_or("RUST_LOG", "info"),
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        Self {
            otlp_endpoint: endpoint.into(),
            ..self
        }
    }

    pub fn with_log_level(self, directive: impl Into<String>) -> Self {
        Self {
            log_level: directive.into(),
            ..self
        }
    }

    pub fn with_version(self, version: impl Into<String>) -> Self {
        Self {
            service_version: version.into(),
            ..self
        }
    }

    pub fn with_traces(self, enable_traces: bool) -> Self {
        Self { enable_traces, ..self }
    }

    pub fn with_metrics(self, enable_metrics: bool) -> Self {
        Self { enable_metrics, ..self }
    }

    pub fn with_logs(self, enable_logs: bool) -> Self {
        Self { enable_logs, ..self }
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes([
                KeyValue::new(SERVICE_NAME, self.service_name.clone()),
                KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
            ])
            .build()
    }
}

/// Install the OpenTelemetry providers and the global tracing subscriber
///
/// Fails on a second call because the global subscriber is already set.
pub fn init_observability(config: ObservabilityConfig) -> Result<(), BoxError> {
    let tracer_provider = config
        .enable_traces
        .then(|| tracer_provider(&config))
        .transpose()?;
    let meter_provider = config
        .enable_metrics
        .then(|| meter_provider(&config))
        .transpose()?;

    let tracer = tracer_provider
        .as_ref()
        .map(|provider| provider.tracer(config.service_name.clone()));
    install_subscriber(&config, tracer)?;

    if let Some(provider) = &tracer_provider {
        global::set_tracer_provider(provider.clone());
    }
    if let Some(provider) = &meter_provider {
        global::set_meter_provider(provider.clone());
    }

    if let Ok(mut installed) = INSTALLED.lock() {
        *installed = Some(Installed {
            tracer: tracer_provider,
            meter: meter_provider,
        });
    }

    tracing::info!(
        service = %config.service_name,
        endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );
    Ok(())
}

fn tracer_provider(config: &ObservabilityConfig) -> Result<SdkTracerProvider, BoxError> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(config.resource())
        .build())
}

fn meter_provider(config: &ObservabilityConfig) -> Result<SdkMeterProvider, BoxError> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build())
}

fn install_subscriber(config: &ObservabilityConfig, tracer: Option<Tracer>) -> Result<(), BoxError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };

    let logs = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
        .with(filter)
        .with(logs)
        .try_init()?;
    Ok(())
}

/// Flush and shut down whatever `init_observability` installed
///
/// Safe to call when nothing was installed, and more than once.
pub fn shutdown_observability() {
    let installed = INSTALLED.lock().ok().and_then(|mut slot| slot.take());
    let Some(installed) = installed else {
        return;
    };

    tracing::info!("Observability shutdown");
    if let Some(provider) = installed.tracer {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
    if let Some(provider) = installed.meter {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "triggerware");
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        assert!(config.enable_traces && config.enable_metrics && config.enable_logs);
    }

    #[test]
    fn test_setters_touch_one_field_each() {
        let config = ObservabilityConfig::new("demo-client")
            .with_endpoint("http://collector:4317")
            .with_log_level("debug")
            .with_version("1.0.0")
            .with_traces(false)
            .with_logs(false);

        assert_eq!(config.service_name, "demo-client");
        assert_eq!(config.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_version, "1.0.0");
        assert!(!config.enable_traces);
        assert!(config.enable_metrics);
        assert!(!config.enable_logs);
    }

    #[test]
    fn test_init_and_shutdown_without_exporters() {
        let config = ObservabilityConfig::new("test-none")
            .with_traces(false)
            .with_metrics(false)
            .with_logs(false)
            .with_log_level("warn");

        assert!(init_observability(config).is_ok());
        shutdown_observability();
        // Nothing left to flush.
        shutdown_observability();
    }
}
