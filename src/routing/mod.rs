//! Target routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request-target ("/http://example.com/a?x=1")
//!     → target.rs (strip "/", parse, classify)
//!     → RewriteOutcome::Resolved(TargetUrl) | RewriteOutcome::Failed
//!     → rewrite.rs (apply outcome to the live request)
//!     → forward to target, or to the diagnostic backend
//! ```
//!
//! # Design Decisions
//! - No route table: the destination is the request path itself
//! - Extraction is a pure function, shared freely across request tasks
//! - Malformed targets are a normal outcome, never a request failure

pub mod rewrite;
pub mod target;

pub use rewrite::{apply, original_request_uri, X_URL_ERROR};
pub use target::{rewrite, RewriteOutcome, TargetUrl, DEFAULT_SCHEME};
