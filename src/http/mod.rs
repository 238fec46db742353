//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (Axum setup, timeouts, relay handler)
//!     → routing (extract target from path, apply to request)
//!     → forward.rs (strip hop-by-hop headers, send upstream)
//!         ├─ resolved target → upstream server
//!         └─ malformed target → diagnostic.rs (loopback, always 200)
//!     → response streamed back to the client
//! ```

pub mod diagnostic;
pub mod forward;
pub mod server;

pub use diagnostic::DiagnosticBackend;
pub use server::{build_router, AppState};
