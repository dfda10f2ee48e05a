//! Windowed aggregates and health reports over tracked operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::OperationRecord;

/// Per operation type aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: usize,
    pub failures: usize,
    pub average_duration_ms: f64,
    pub max_duration_ms: f64,
}

/// Aggregates over the operations finished inside a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub window_secs: u64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 1.0 when no operation finished in the window.
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub by_type: BTreeMap<String, TypeStats>,
}

impl Analytics {
    pub(crate) fn from_records<'a>(
        window_secs: u64,
        records: impl IntoIterator<Item = &'a OperationRecord>,
    ) -> Self {
        let mut total = 0;
        let mut succeeded = 0;
        let mut duration_sum = 0.0;
        let mut by_type: BTreeMap<String, TypeStats> = BTreeMap::new();

        for record in records {
            total += 1;
            if record.success {
                succeeded += 1;
            }
            duration_sum += record.duration_ms;

            let stats = by_type.entry(record.op_type.clone()).or_default();
            stats.count += 1;
            if !record.success {
                stats.failures += 1;
            }
            // Running sum; turned into an average below.
            stats.average_duration_ms += record.duration_ms;
            stats.max_duration_ms = stats.max_duration_ms.max(record.duration_ms);
        }

        for stats in by_type.values_mut() {
            stats.average_duration_ms /= stats.count as f64;
        }

        Self {
            window_secs,
            total,
            succeeded,
            failed: total - succeeded,
            success_rate: if total == 0 {
                1.0
            } else {
                succeeded as f64 / total as f64
            },
            average_duration_ms: if total == 0 {
                0.0
            } else {
                duration_sum / total as f64
            },
            by_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub issues: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
