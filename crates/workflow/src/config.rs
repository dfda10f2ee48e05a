use domain::DEFAULT_PLATFORM_FEE_RATE;
use order_store::RetryPolicy;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Fraction of the subtotal charged as platform fee.
    pub platform_fee_rate: f64,
    /// Retry policy for the persistence gateway.
    pub retry: RetryPolicy,
    /// Order numbers generated before a duplicate number is reported.
    pub order_number_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: DEFAULT_PLATFORM_FEE_RATE,
            retry: RetryPolicy::default(),
            order_number_attempts: 3,
        }
    }
}

impl WorkflowConfig {
    pub fn with_fee_rate(mut self, rate: f64) -> Self {
        self.platform_fee_rate = rate;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
