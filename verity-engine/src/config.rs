//! Engine tunables: batching windows, timeouts, and the retry policy.

use std::time::Duration;

/// Retry policy for bulk requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Timing windows and limits for bulk operation batching.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum idle time since the last intent before a flush fires.
    pub quiescence_window: Duration,
    /// Maximum time a batch may stay open before a flush fires regardless.
    pub max_batch_age: Duration,
    /// Deadline for a single bulk API request.
    pub operation_timeout: Duration,
    /// Advisory cap reported by sizing probes; batch build does not enforce it.
    pub max_batch_size: usize,
    /// DELETE requests carry names as query parameters; chunk above this count
    /// to stay under server URL length limits.
    pub max_delete_batch: usize,
    /// Pause between chunked DELETE requests.
    pub delete_chunk_pause: Duration,
    /// How long after a batch completes resource reads still count as "recent".
    pub recent_ops_window: Duration,
    /// Settle time after a successful flush before read caches are invalidated.
    pub post_flush_settle: Duration,
    /// Settle time before fetching auto-generated fields after a PUT.
    pub autogen_fetch_delay: Duration,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiescence_window: Duration::from_secs(2),
            max_batch_age: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(300),
            max_batch_size: 1000,
            max_delete_batch: 100,
            delete_chunk_pause: Duration::from_millis(100),
            recent_ops_window: Duration::from_secs(5),
            post_flush_settle: Duration::from_millis(800),
            autogen_fetch_delay: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// A configuration with near-zero waits, for tests.
    pub fn fast() -> Self {
        Self {
            quiescence_window: Duration::from_millis(10),
            max_batch_age: Duration::from_millis(50),
            operation_timeout: Duration::from_secs(5),
            delete_chunk_pause: Duration::from_millis(1),
            recent_ops_window: Duration::from_millis(100),
            post_flush_settle: Duration::from_millis(1),
            autogen_fetch_delay: Duration::from_millis(1),
            retry: RetryConfig {
                max_retries: 5,
                initial_delay: Duration::from_millis(1),
                backoff_factor: 2.0,
                max_delay: Duration::from_millis(8),
            },
            ..Self::default()
        }
    }
}
