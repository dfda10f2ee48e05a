//! Performance monitor for workflow operations.
//!
//! Purely observational: nothing here can fail the operation being measured.

pub mod analytics;
pub mod performance;
pub mod sink;

pub use analytics::{Analytics, HealthReport, HealthStatus, TypeStats};
pub use performance::{MonitorConfig, OperationRecord, PerformanceMonitor};
pub use sink::{InMemoryMetricSink, MetricSink, SinkError, TracingMetricSink};
