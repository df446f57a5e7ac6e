//! Telemetry for zcio: structured logging and metrics.

mod logging;
mod metrics;

pub use self::logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    init_metrics, record_allocator_usage, record_buffer_alloc, record_buffer_free,
    record_buffer_ref, record_cache_eviction,
};
