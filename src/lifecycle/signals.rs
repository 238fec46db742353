//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful shutdown. The relay core never
//! installs handlers itself; the binary waits here and then calls
//! `Relay::shutdown`.

/// Wait for an interrupt or terminate request and return its name.
#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Wait for an interrupt request and return its name.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
