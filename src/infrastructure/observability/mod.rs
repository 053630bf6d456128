//! In-process observability for the decision loop
//!
//! Counters and gauges only. Nothing is exported over the network; callers render
//! the registry into the log when they want a snapshot.

pub mod metrics;

pub use metrics::Metrics;
