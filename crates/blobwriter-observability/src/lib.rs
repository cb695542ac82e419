//! Blobwriter Observability
//!
//! Prometheus metrics for the partition writers. Structured logging is done
//! directly with `tracing` at the call sites; this crate only owns the metric
//! registry.
//!
//! # Usage
//!
//! ```no_run
//! use blobwriter_observability::metrics;
//!
//! metrics::init();
//! print!("{}", metrics::render());
//! ```

pub mod metrics;

pub use metrics::{init as init_metrics, render, REGISTRY};
