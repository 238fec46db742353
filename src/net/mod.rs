//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured host:port
//!     → listener.rs (normalize, bind)
//!     → axum::serve (task per connection)
//!     → connection.rs (in-flight accounting per request)
//! ```

pub mod connection;
pub mod listener;

pub use connection::{InFlightGuard, InFlightTracker};
