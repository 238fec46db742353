//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. Validation collects
//! every problem instead of stopping at the first.

use std::net::SocketAddr;

use crate::config::schema::{RelayConfig, DEFAULT_BIND_ADDRESS};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Error returned when a listen address is not of the form `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError {
    pub address: String,
    pub reason: &'static str,
}

impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "address {}: {}", self.address, self.reason)
    }
}

impl std::error::Error for AddressError {}

/// Split `host:port`, `[ipv6]:port` or `:port` into its host and port.
///
/// The host may be empty (all interfaces). The port may be empty (any
/// port); when present it must be numeric and fit in a `u16`.
pub fn split_host_port(address: &str) -> Result<(&str, &str), AddressError> {
    let err = |reason| AddressError {
        address: address.to_string(),
        reason,
    };

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| err("missing ']' in address"))?;
        let host = &rest[..end];
        let port = rest[end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| err("missing port in address"))?;
        (host, port)
    } else {
        let colon = address.rfind(':').ok_or_else(|| err("missing port in address"))?;
        let host = &address[..colon];
        if host.contains(':') {
            return Err(err("too many colons in address"));
        }
        (host, &address[colon + 1..])
    };

    if host.contains(['[', ']']) || port.contains(['[', ']']) {
        return Err(err("unexpected bracket in address"));
    }
    if !port.is_empty() && port.parse::<u16>().is_err() {
        return Err(err("invalid port"));
    }

    Ok((host, port))
}

/// Validate a full configuration, returning every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address != DEFAULT_BIND_ADDRESS {
        if let Err(e) = split_host_port(&config.listener.bind_address) {
            errors.push(ValidationError {
                field: "listener.bind_address",
                message: e.to_string(),
            });
        }
    }

    if config.timeouts.read_secs == 0 {
        errors.push(ValidationError {
            field: "timeouts.read_secs",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.timeouts.write_secs == 0 {
        errors.push(ValidationError {
            field: "timeouts.write_secs",
            message: "must be greater than zero".to_string(),
        });
    }

    if config.observability.log_level.trim().is_empty() {
        errors.push(ValidationError {
            field: "observability.log_level",
            message: "must not be empty".to_string(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address",
            message: format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
