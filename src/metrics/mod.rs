//! Prometheus counters for the request pipeline and token renewals.

mod recorder;

pub use recorder::{Metrics, MetricsRecorder};
