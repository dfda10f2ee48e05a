//! Operation tracking and the in-memory operation log.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{Analytics, HealthReport, HealthStatus, MetricSink, TracingMetricSink};

/// Error recorded for a tracked operation whose future was dropped.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Successful operations slower than this are persisted.
    pub slow_threshold: Duration,
    /// Size of the in-memory operation log.
    pub log_capacity: usize,
    /// Health is degraded below this success rate.
    pub degraded_success_rate: f64,
    /// Health is degraded above this average duration.
    pub degraded_latency: Duration,
    /// Window `check_health` looks at.
    pub health_window: Duration,
    /// Records waiting for the sink beyond this are dropped.
    pub sink_queue_capacity: usize,
    /// Longest a single sink write may take.
    pub sink_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(1000),
            log_capacity: 1000,
            degraded_success_rate: 0.95,
            degraded_latency: Duration::from_millis(2000),
            health_window: Duration::from_secs(300),
            sink_queue_capacity: 1024,
            sink_timeout: Duration::from_secs(5),
        }
    }
}

/// One finished operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op_id: String,
    pub op_type: String,
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub error: Option<String>,
}

struct InFlight {
    op_type: String,
    metadata: Value,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Tracks operation durations and outcomes.
///
/// Keeps a bounded log of recent operations and hands slow or failed
/// ones to a [`MetricSink`] through a bounded queue drained by a
/// background writer, so a slow sink never holds up the operation being
/// measured. Sink failures and timeouts are logged and dropped.
#[derive(Clone)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    in_flight: Arc<DashMap<String, InFlight>>,
    log: Arc<Mutex<VecDeque<OperationRecord>>>,
    sink: Arc<dyn MetricSink>,
    writer: Arc<OnceLock<mpsc::Sender<OperationRecord>>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            config,
            in_flight: Arc::new(DashMap::new()),
            log: Arc::new(Mutex::new(VecDeque::new())),
            sink,
            writer: Arc::new(OnceLock::new()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Records the start of an operation. Restarting a known id resets it.
    pub fn start_tracking(&self, op_id: impl Into<String>, op_type: impl Into<String>, metadata: Value) {
        self.in_flight.insert(
            op_id.into(),
            InFlight {
                op_type: op_type.into(),
                metadata,
                started_at: Utc::now(),
                started: Instant::now(),
            },
        );
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Finishes an operation. Returns `None` for an id that was never started.
    pub async fn end_tracking(
        &self,
        op_id: &str,
        success: bool,
        error: Option<String>,
    ) -> Option<OperationRecord> {
        self.finish(op_id, success, error)
    }

    fn finish(&self, op_id: &str, success: bool, error: Option<String>) -> Option<OperationRecord> {
        let Some((op_id, started)) = self.in_flight.remove(op_id) else {
            tracing::warn!(op_id, "end_tracking called for unknown operation");
            return None;
        };

        let elapsed = started.started.elapsed();
        let record = OperationRecord {
            op_id,
            op_type: started.op_type,
            metadata: started.metadata,
            started_at: started.started_at,
            finished_at: Utc::now(),
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            success,
            error,
        };

        metrics::histogram!("operation_duration_seconds", "operation" => record.op_type.clone())
            .record(elapsed.as_secs_f64());

        {
            let mut log = self.log();
            if log.len() >= self.config.log_capacity.max(1) {
                log.pop_front();
            }
            log.push_back(record.clone());
        }

        if !success || elapsed > self.config.slow_threshold {
            self.enqueue(record.clone());
        }

        Some(record)
    }

    fn log(&self) -> MutexGuard<'_, VecDeque<OperationRecord>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, record: OperationRecord) {
        let Some(writer) = self.writer() else {
            tracing::warn!(op_id = %record.op_id, "No runtime for the metric sink, dropping record");
            return;
        };
        if let Err(e) = writer.try_send(record) {
            let record = match e {
                mpsc::error::TrySendError::Full(record) | mpsc::error::TrySendError::Closed(record) => record,
            };
            metrics::counter!("monitor_records_dropped_total").increment(1);
            tracing::warn!(op_id = %record.op_id, "Metric sink queue unavailable, dropping record");
        }
    }

    /// Starts the sink writer on first use, on the current runtime.
    fn writer(&self) -> Option<&mpsc::Sender<OperationRecord>> {
        if let Some(writer) = self.writer.get() {
            return Some(writer);
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        Some(self.writer.get_or_init(|| {
            let (tx, rx) = mpsc::channel(self.config.sink_queue_capacity.max(1));
            handle.spawn(run_sink_writer(self.sink.clone(), rx, self.config.sink_timeout));
            tx
        }))
    }

    /// Runs `operation` between `start_tracking` and `end_tracking` and
    /// returns its result unchanged. If the returned future is dropped
    /// before `operation` completes, the operation is recorded as failed
    /// with the error [`CANCELLED`].
    pub async fn track<T, E, F>(&self, op_type: &str, metadata: Value, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let op_id = Uuid::new_v4().to_string();
        self.start_tracking(op_id.clone(), op_type, metadata);
        let guard = TrackGuard {
            monitor: self,
            op_id: Some(op_id),
        };
        let result = operation.await;
        match &result {
            Ok(_) => guard.finish(true, None),
            Err(e) => guard.finish(false, Some(e.to_string())),
        }
        result
    }

    /// Returns the operations currently in the log, oldest first.
    pub async fn recent(&self) -> Vec<OperationRecord> {
        self.log().iter().cloned().collect()
    }

    /// Aggregates operations that finished within `window`.
    pub async fn get_analytics(&self, window: Duration) -> Analytics {
        let since = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));
        let log = self.log();
        Analytics::from_records(
            window.as_secs(),
            log.iter()
                .filter(|r| since.is_none_or(|since| r.finished_at >= since)),
        )
    }

    pub async fn check_health(&self) -> HealthReport {
        let analytics = self.get_analytics(self.config.health_window).await;
        let mut issues = Vec::new();

        if analytics.success_rate < self.config.degraded_success_rate {
            issues.push(format!(
                "Success rate {:.1}% is below {:.1}%",
                analytics.success_rate * 100.0,
                self.config.degraded_success_rate * 100.0
            ));
        }
        let latency_ms = self.config.degraded_latency.as_secs_f64() * 1000.0;
        if analytics.average_duration_ms > latency_ms {
            issues.push(format!(
                "Average duration {:.0}ms is above {:.0}ms",
                analytics.average_duration_ms, latency_ms
            ));
        }

        HealthReport {
            status: if issues.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            success_rate: analytics.success_rate,
            average_duration_ms: analytics.average_duration_ms,
            issues,
        }
    }
}

/// Ends the tracked operation when dropped without an outcome.
struct TrackGuard<'a> {
    monitor: &'a PerformanceMonitor,
    op_id: Option<String>,
}

impl TrackGuard<'_> {
    fn finish(mut self, success: bool, error: Option<String>) {
        if let Some(op_id) = self.op_id.take() {
            self.monitor.finish(&op_id, success, error);
        }
    }
}

impl Drop for TrackGuard<'_> {
    fn drop(&mut self) {
        if let Some(op_id) = self.op_id.take() {
            tracing::debug!(%op_id, "Tracked operation dropped before completion");
            self.monitor.finish(&op_id, false, Some(CANCELLED.to_string()));
        }
    }
}

async fn run_sink_writer(
    sink: Arc<dyn MetricSink>,
    mut records: mpsc::Receiver<OperationRecord>,
    timeout: Duration,
) {
    while let Some(record) = records.recv().await {
        match tokio::time::timeout(timeout, sink.persist(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(op_id = %record.op_id, error = %e, "Failed to persist operation metrics");
            }
            Err(_) => {
                metrics::counter!("monitor_sink_timeouts_total").increment(1);
                tracing::warn!(op_id = %record.op_id, ?timeout, "Metric sink timed out");
            }
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default(), Arc::new(TracingMetricSink))
    }
}
