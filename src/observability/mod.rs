//! Logs and metrics.
//!
//! `logging` installs the tracing subscriber once at startup. `metrics`
//! wraps the counters and histogram the routing pipeline, the early
//! redirect handler and the retention sweeper emit; a Prometheus scrape
//! endpoint is installed only when enabled.

pub mod logging;
pub mod metrics;
