//! The relay: one frontend listener plus its diagnostic backend.
//!
//! ```text
//! start():    NotStarted → Running
//!             upstream client built → diagnostic backend up → frontend bound
//!             → serve until drained
//! shutdown(): Running → ShuttingDown
//!             close diagnostic backend (forced) → drain frontend (bounded)
//!             → Stopped once the frontend has quiesced
//! ```

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::http::diagnostic::DiagnosticBackend;
use crate::http::forward::build_client;
use crate::http::server::{build_router, AppState};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::state::{Lifecycle, RelayState};
use crate::net::{listener, InFlightTracker};

/// A reverse-proxy relay forwarding each request to the URL in its path.
///
/// Owns both of its listeners; create one per process and share it by
/// reference (or `Arc`) between the task running [`start`](Self::start) and
/// the one calling [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct Relay {
    config: RelayConfig,
    lifecycle: Lifecycle,
    drain: Shutdown,
    backend: Mutex<Option<DiagnosticBackend>>,
    frontend_addr: watch::Sender<Option<SocketAddr>>,
    in_flight: InFlightTracker,
}

impl Relay {
    /// Build a relay for an already validated configuration. Nothing is bound
    /// until [`start`](Self::start).
    pub fn new(config: RelayConfig) -> Self {
        let (frontend_addr, _) = watch::channel(None);
        Self {
            config,
            lifecycle: Lifecycle::new(),
            drain: Shutdown::new(),
            backend: Mutex::new(None),
            frontend_addr,
            in_flight: InFlightTracker::new(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.lifecycle.current()
    }

    /// Address the frontend is bound to, once it is.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.frontend_addr.borrow()
    }

    /// Wait until the frontend is bound, or the relay stopped without binding.
    pub async fn listening(&self) -> Option<SocketAddr> {
        let mut addr = self.frontend_addr.subscribe();
        tokio::select! {
            bound = addr.wait_for(Option::is_some) => bound.ok().and_then(|addr| *addr),
            _ = self.lifecycle.reached(RelayState::Stopped) => self.local_addr(),
        }
    }

    /// Number of requests currently being relayed.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.active_count()
    }

    /// Start the diagnostic backend, then bind and serve the frontend.
    ///
    /// Resolves once the frontend has drained after [`shutdown`](Self::shutdown),
    /// or with the error that stopped it. Failures are not retried.
    pub async fn start(&self) -> Result<()> {
        if let Err(state) = self.lifecycle.advance(RelayState::Running) {
            tracing::warn!(state = %state, "Relay start refused");
            return Err(RelayError::AlreadyStarted);
        }

        let result = self.serve().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Relay stopped with error");
        }

        // Covers a shutdown racing with startup, and startup failures.
        if let Some(backend) = self.take_backend() {
            backend.close().await;
        }
        let _ = self.lifecycle.advance(RelayState::Stopped);

        result
    }

    async fn serve(&self) -> Result<()> {
        let client = build_client().map_err(RelayError::Tls)?;

        let backend = DiagnosticBackend::start().await?;
        let diagnostic_addr = backend.local_addr();
        *self.backend.lock().unwrap_or_else(PoisonError::into_inner) = Some(backend);

        let (listener, local_addr) = listener::bind(&self.config.listener.bind_address).await?;
        self.frontend_addr.send_replace(Some(local_addr));

        tracing::info!(
            address = %local_addr,
            diagnostic_address = %diagnostic_addr,
            read_timeout = ?self.config.timeouts.read(),
            write_timeout = ?self.config.timeouts.write(),
            "Relay running"
        );

        let app = build_router(
            &self.config.timeouts,
            AppState::new(
                client,
                diagnostic_addr,
                self.in_flight.clone(),
                &self.config.timeouts,
            ),
        );

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(self.drain.signalled())
            .await
            .map_err(RelayError::Serve)?;

        tracing::info!(address = %local_addr, "Frontend stopped");
        Ok(())
    }

    /// Stop the relay, giving in-flight requests until `deadline` to finish.
    ///
    /// The diagnostic backend is closed immediately; the frontend stops
    /// accepting and drains. Returns [`RelayError::ShutdownTimeout`] when the
    /// frontend is still busy at the deadline. Only the first call does
    /// anything.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let previous = match self.lifecycle.advance(RelayState::ShuttingDown) {
            Ok(previous) => previous,
            Err(state) => {
                tracing::debug!(state = %state, "Shutdown already requested");
                return Ok(());
            }
        };

        if previous == RelayState::NotStarted {
            let _ = self.lifecycle.advance(RelayState::Stopped);
            return Ok(());
        }

        tracing::info!(
            in_flight = self.in_flight.active_count(),
            deadline = ?deadline,
            "Shutting down relay"
        );

        if let Some(backend) = self.take_backend() {
            backend.close().await;
        }
        self.drain.trigger();

        match tokio::time::timeout(deadline, self.lifecycle.reached(RelayState::Stopped)).await {
            Ok(()) => {
                tracing::info!("Relay stopped");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    in_flight = self.in_flight.active_count(),
                    "Frontend did not drain before deadline"
                );
                Err(RelayError::ShutdownTimeout(deadline))
            }
        }
    }

    fn take_backend(&self) -> Option<DiagnosticBackend> {
        self.backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
