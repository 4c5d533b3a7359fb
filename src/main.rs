use anyhow::{Context, Result};
use live_power::config::Config;
use live_power::http::{router, HttpState};
use live_power::pull::HttpPullPoller;
use live_power::push::PgPushReader;
use live_power::store::PgProjectStore;
use live_power::SourceResolver;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,live_power=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let otlp_endpoint = config
        .otlp_endpoint
        .as_deref()
        .and_then(normalize_otlp_http_endpoint);
    if let Some(endpoint) = otlp_endpoint {
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "live-power"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Appends the OTLP/HTTP traces path. A blank endpoint disables export.
fn normalize_otlp_http_endpoint(endpoint: &str) -> Option<String> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("/v1/traces") {
        return Some(trimmed.to_string());
    }
    Some(format!("{}/v1/traces", trimmed.trim_end_matches('/')))
}

async fn build_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .context("failed to connect to the project database")?;
    Ok(pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let pool = build_pool(
        &config.database_url,
        config.db_pool_size,
        config.request_timeout(),
    )
    .await?;
    let client = HttpPullPoller::build_client(config.request_timeout(), &config.user_agent)?;
    let resolver = SourceResolver::new(
        Arc::new(PgPushReader::new(pool.clone())),
        Arc::new(HttpPullPoller::new(client)),
    )
    .with_push_timeout(config.request_timeout());
    let state = HttpState {
        store: Arc::new(PgProjectStore::new(pool)),
        resolver: Arc::new(resolver),
        poll_interval: config.poll_interval(),
    };

    let listener = tokio::net::TcpListener::bind(config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    tracing::info!(
        bind = %config.http_bind,
        poll_interval_ms = config.poll_interval_ms,
        request_timeout_ms = config.request_timeout_ms,
        "live-power listening"
    );

    let server = axum::serve(listener, router(state)).with_graceful_shutdown(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
        }
    });
    if let Err(err) = server.await {
        tracing::error!(error=%err, "http server exited");
    }

    Ok(())
}
