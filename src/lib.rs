//! Path-addressed reverse-proxy relay.
//!
//! Every request is forwarded to the URL written in its own path:
//! `GET /http://example.com/foo?q=1` is relayed to `http://example.com/foo?q=1`.
//! Paths that do not hold a usable URL are answered by an internal
//! diagnostic backend with `200 OK` and a body describing the problem.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::RelayConfig;
pub use error::RelayError;
pub use lifecycle::{Relay, RelayState};
pub use routing::{rewrite, RewriteOutcome, TargetUrl};
