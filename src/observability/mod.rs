//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay lifecycle and request handling produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (request counters and latency histograms)
//!
//! Consumers:
//!     → stdout via the fmt subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
