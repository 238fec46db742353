//! Structured logging.
//!
//! Events go through `tracing`. Informational messages use `info!`; a fatal
//! condition is logged with `error!` and the binary exits, the library never
//! terminates the process itself.

use tracing_subscriber::{filter::ParseError, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `log_level` when it is set.
pub fn init(log_level: &str) -> Result<(), ParseError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
