//! Errors surfaced by the relay lifecycle.
//!
//! Malformed target URLs never appear here: they are an expected branch of
//! request handling and end up in the diagnostic response instead.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The frontend listener could not bind its configured address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The diagnostic backend could not be started.
    #[error("failed to start diagnostic backend: {0}")]
    Diagnostic(#[source] std::io::Error),

    /// The upstream TLS client could not be configured.
    #[error("failed to configure upstream TLS: {0}")]
    Tls(#[source] rustls::Error),

    /// The frontend stopped serving because of an I/O failure.
    #[error("frontend server failed: {0}")]
    Serve(#[source] std::io::Error),

    /// `start` was called on a relay that already left `NotStarted`.
    #[error("relay has already been started")]
    AlreadyStarted,

    /// In-flight requests did not finish before the shutdown deadline.
    #[error("frontend did not drain within {0:?}")]
    ShutdownTimeout(Duration),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
