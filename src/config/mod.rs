//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → command-line overrides applied by the binary
//!     → handed to Relay::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the relay is built
//! - All fields have defaults to allow minimal configs
//! - Address syntax is checked here, never inside the relay core

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ListenerConfig, ObservabilityConfig, RelayConfig, TimeoutConfig};
pub use validation::{split_host_port, validate_config, AddressError, ValidationError};
