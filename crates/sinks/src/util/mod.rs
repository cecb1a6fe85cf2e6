//! Sink utilities
//!
//! - **batch**: Receiver/Committer pair that batches records, flushes on a
//!   timer or size threshold, and rotates destinations between batches
//! - **rotation**: UTC-aligned rotation intervals
//! - **rate_limited_logger**: per-record warnings without log floods

pub mod batch;
pub mod rate_limited_logger;
pub mod rotation;

pub use batch::{
    Batch, BatchConfig, BatchMetrics, BatchMetricsSnapshot, Committer, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_RETRY_DELAY, DEFAULT_WRITE_RETRIES, run_batching,
};
pub use rate_limited_logger::{DEFAULT_LOG_INTERVAL, RateLimitedLogger};
pub use rotation::{ALLOWED_ROTATION_HOURS, RotationInterval};
