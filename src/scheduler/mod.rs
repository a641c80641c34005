pub mod expiration;

pub use expiration::{
    ExpirationRunReport, ExpirationWarningJob, MetricsSnapshot, SchedulerMetrics, WARNINGS_FAILED,
    WARNINGS_SENT,
};
