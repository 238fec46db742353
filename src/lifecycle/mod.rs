//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (relay.rs):
//!     Start diagnostic backend → Bind frontend → Serve
//!
//! Shutdown (relay.rs, shutdown.rs):
//!     Close diagnostic backend → Stop accepting → Drain (bounded) → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller invokes Relay::shutdown
//! ```
//!
//! # Design Decisions
//! - The diagnostic backend is up before the frontend accepts anything
//! - States only move forward (state.rs)
//! - Shutdown has a deadline: a slow drain is reported, not waited out

pub mod relay;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use relay::Relay;
pub use shutdown::Shutdown;
pub use state::{Lifecycle, RelayState};
