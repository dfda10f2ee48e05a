//! Destinations for operations worth keeping: slow or failed ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::OperationRecord;

#[derive(Debug, Error)]
#[error("Metric sink error: {0}")]
pub struct SinkError(pub String);

#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn persist(&self, record: &OperationRecord) -> Result<(), SinkError>;
}

/// Writes persisted operations to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricSink;

#[async_trait]
impl MetricSink for TracingMetricSink {
    async fn persist(&self, record: &OperationRecord) -> Result<(), SinkError> {
        if record.success {
            tracing::warn!(
                op_id = %record.op_id,
                op_type = %record.op_type,
                duration_ms = record.duration_ms,
                "Slow operation"
            );
        } else {
            tracing::warn!(
                op_id = %record.op_id,
                op_type = %record.op_type,
                duration_ms = record.duration_ms,
                error = record.error.as_deref().unwrap_or("unknown"),
                "Failed operation"
            );
        }
        Ok(())
    }
}

/// Keeps persisted operations in memory, with a switch to simulate outages.
#[derive(Clone, Default)]
pub struct InMemoryMetricSink {
    records: Arc<RwLock<Vec<OperationRecord>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<OperationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl MetricSink for InMemoryMetricSink {
    async fn persist(&self, record: &OperationRecord) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError("sink offline".to_string()));
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
