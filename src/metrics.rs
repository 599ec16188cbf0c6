use std::{fmt, sync::Arc, time::Duration, time::SystemTime};

use anyhow::Context;
use axum::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_sdk_cloudwatch::{
    config::Region,
    types::{MetricDatum, StandardUnit},
    Client,
};
use aws_smithy_types::DateTime;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::config::MetricsConfig;

/// Counters pushed to the monitoring namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    GetUsers,
    GetUserById,
    CreateUser,
    UpdateUser,
    DeleteUser,
    DatabaseConnection,
    DatabaseError,
    ApiError,
    ServerStart,
    ServerShutdown,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::GetUsers => "GetUsers",
            MetricName::GetUserById => "GetUserById",
            MetricName::CreateUser => "CreateUser",
            MetricName::UpdateUser => "UpdateUser",
            MetricName::DeleteUser => "DeleteUser",
            MetricName::DatabaseConnection => "DatabaseConnection",
            MetricName::DatabaseError => "DatabaseError",
            MetricName::ApiError => "APIError",
            MetricName::ServerStart => "ServerStart",
            MetricName::ServerShutdown => "ServerShutdown",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One count data point. The unit is always `Count`.
#[derive(Debug, Clone)]
pub struct Datum {
    pub name: MetricName,
    pub value: f64,
    pub timestamp: SystemTime,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn put_count(&self, datum: &Datum) -> anyhow::Result<()>;
}

/// CloudWatch `PutMetricData` into a fixed namespace.
#[derive(Clone)]
pub struct CloudWatchSink {
    client: Client,
    namespace: String,
}

impl CloudWatchSink {
    pub async fn new(cfg: &MetricsConfig) -> Self {
        let mut loader = defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));
        if let Some(endpoint) = cfg.endpoint.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        Self {
            client: Client::new(&shared),
            namespace: cfg.namespace.clone(),
        }
    }
}

#[async_trait]
impl MetricsSink for CloudWatchSink {
    async fn put_count(&self, datum: &Datum) -> anyhow::Result<()> {
        let metric = MetricDatum::builder()
            .metric_name(datum.name.as_str())
            .value(datum.value)
            .unit(StandardUnit::Count)
            .timestamp(DateTime::from(datum.timestamp))
            .build();

        self.client
            .put_metric_data()
            .namespace(&self.namespace)
            .metric_data(metric)
            .send()
            .await
            .context("cloudwatch put_metric_data")?;
        Ok(())
    }
}

/// Used when `METRICS_ENABLED=false`.
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    async fn put_count(&self, datum: &Datum) -> anyhow::Result<()> {
        debug!(metric = %datum.name, value = datum.value, "metrics disabled, dropping");
        Ok(())
    }
}

/// Handle used by request handlers. Emitting never blocks and never fails:
/// data points go onto a bounded queue drained by [`MetricsWorker`].
#[derive(Clone)]
pub struct Metrics {
    tx: mpsc::Sender<Datum>,
}

/// Background task that forwards queued data points to the sink.
pub struct MetricsWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Metrics {
    pub fn spawn(sink: Arc<dyn MetricsSink>, capacity: usize) -> (Self, MetricsWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(rx, sink, stop_rx));
        (
            Self { tx },
            MetricsWorker {
                stop: stop_tx,
                handle,
            },
        )
    }

    pub fn emit_count(&self, name: MetricName, value: f64) {
        let datum = Datum {
            name,
            value,
            timestamp: SystemTime::now(),
        };
        match self.tx.try_send(datum) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(d)) => {
                warn!(metric = %d.name, "metrics queue full, dropping data point");
            }
            Err(mpsc::error::TrySendError::Closed(d)) => {
                debug!(metric = %d.name, "metrics queue closed, dropping data point");
            }
        }
    }
}

impl MetricsWorker {
    /// Stops accepting new data points and waits up to `timeout` for the
    /// already queued ones to be delivered.
    pub async fn shutdown(self, timeout: Duration) {
        let _ = self.stop.send(());
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => info!("metrics flushed"),
            Ok(Err(e)) => warn!(error = %e, "metrics worker panicked"),
            Err(_) => warn!(?timeout, "metrics flush timed out"),
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Datum>,
    sink: Arc<dyn MetricsSink>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(datum) => deliver(sink.as_ref(), &datum).await,
                None => return,
            },
            _ = &mut stop => break,
        }
    }

    rx.close();
    while let Some(datum) = rx.recv().await {
        deliver(sink.as_ref(), &datum).await;
    }
}

async fn deliver(sink: &dyn MetricsSink, datum: &Datum) {
    if let Err(e) = sink.put_count(datum).await {
        warn!(error = %e, metric = %datum.name, "metric delivery failed");
    }
}
