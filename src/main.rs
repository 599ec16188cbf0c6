use std::{sync::Arc, time::Duration};

use anyhow::Context;

mod app;
mod config;
mod error;
mod metrics;
mod state;
mod users;

use crate::{
    config::AppConfig,
    metrics::{CloudWatchSink, MetricName, Metrics, MetricsSink, NoopSink},
    state::AppState,
    users::repo::{PgUserStore, UserStore},
};

const METRICS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userdata_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::connect(&config.database)?);
    let sink: Arc<dyn MetricsSink> = if config.metrics.enabled {
        Arc::new(CloudWatchSink::new(&config.metrics).await)
    } else {
        tracing::info!("metrics disabled");
        Arc::new(NoopSink)
    };
    let (metrics, metrics_worker) = Metrics::spawn(sink, config.metrics.queue_capacity);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("server running on {}", addr);

    app::init_database(users.as_ref(), &metrics).await;
    metrics.emit_count(MetricName::ServerStart, 1.0);

    let state = AppState::new(users.clone(), metrics.clone());
    let served = app::serve(listener, app::build_app(state)).await;

    tracing::info!("shutting down server");
    metrics.emit_count(MetricName::ServerShutdown, 1.0);
    users.close().await;
    metrics_worker.shutdown(METRICS_FLUSH_TIMEOUT).await;

    served
}
