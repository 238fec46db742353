//! Frontend TCP listener.
//!
//! # Responsibilities
//! - Turn the configured `host:port` into something the OS can bind
//! - Bind it, reporting failures as [`RelayError::Bind`]
//!
//! The address has already been validated by the caller; an empty host means
//! every interface and an empty port means an ephemeral one.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::error::RelayError;

/// Normalize a validated `host:port` for binding.
pub fn bind_target(address: &str) -> String {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let host = if host.is_empty() { "0.0.0.0" } else { host };
            let port = if port.is_empty() { "0" } else { port };
            format!("{}:{}", host, port)
        }
        None => address.to_string(),
    }
}

/// Bind the frontend listener.
pub async fn bind(address: &str) -> Result<(TcpListener, SocketAddr), RelayError> {
    let bind_error = |source: std::io::Error| RelayError::Bind {
        address: address.to_string(),
        source,
    };

    let listener = TcpListener::bind(bind_target(address))
        .await
        .map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    tracing::info!(address = %local_addr, "Listener bound");

    Ok((listener, local_addr))
}
