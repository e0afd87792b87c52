use anyhow::{Context, Result};
use axum::{http::header, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_stdout::SpanExporter;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetryConfig;

const SERVICE_NAME: &str = "css-chat";

/// Process-wide metrics recorder and tracing subscriber.
///
/// Dropping it flushes and stops span export.
pub struct Telemetry {
    metrics_handle: PrometheusHandle,
    tracer_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn init(config: &TelemetryConfig) -> Result<Self> {
        let filter = log_filter(&config.log_filter)?;
        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus metrics recorder")?;

        let tracer_provider = config.otel_stdout.then(stdout_provider);
        let span_export = tracer_provider.as_ref().map(|provider| {
            global::set_tracer_provider(provider.clone());
            tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(span_export)
            .try_init()
            .context("failed to initialise tracing subscriber")?;

        info!(
            log_filter = %config.log_filter,
            otel_stdout = config.otel_stdout,
            "telemetry initialised"
        );
        Ok(Self {
            metrics_handle,
            tracer_provider,
        })
    }

    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.metrics_handle.clone()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        let Some(provider) = self.tracer_provider.take() else {
            return;
        };
        if let Err(err) = provider.shutdown() {
            warn!(error = %err, "span exporter did not shut down cleanly");
        }
    }
}

/// Routes for the side listener: Prometheus scrape plus a liveness check.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route(
            "/metrics",
            get(move || {
                let body = handle.render();
                async move { ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body) }
            }),
        )
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn stdout_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_attributes(vec![KeyValue::new("service.name", SERVICE_NAME)])
                .build(),
        )
        .build()
}

/// `RUST_LOG` wins over the configured directives.
fn log_filter(configured: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(configured)
            .with_context(|| format!("invalid log filter: {configured}")),
    }
}
