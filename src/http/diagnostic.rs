//! Diagnostic backend for malformed targets.
//!
//! Requests whose path does not hold a usable URL are relayed here instead
//! of failing at the transport layer. The backend answers every request with
//! `200 OK` and a body naming the original request-target and the parse
//! error, both taken from headers set by the rewriter.
//!
//! The backend listens on an ephemeral loopback port and is owned by the
//! relay. It has no graceful shutdown: [`DiagnosticBackend::close`] drops
//! every open connection at once.

use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::{
    body::Body,
    http::{header::REFERER, HeaderMap, Request, StatusCode},
    response::Response,
};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::RelayError;
use crate::routing::X_URL_ERROR;

const BODY_PREFIX: &[u8] = b"malformed target URL:";
const LINE_END: &[u8] = b"\r\n";

/// Render the malformed-target response from the carrier headers.
///
/// Always `200 OK`. Missing headers render as empty strings; nothing from
/// the request is echoed back as a header.
pub fn respond(headers: &HeaderMap) -> Response {
    let original = headers.get(REFERER).map(|v| v.as_bytes()).unwrap_or_default();
    let error = headers
        .get(X_URL_ERROR)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    let mut body = Vec::with_capacity(BODY_PREFIX.len() + original.len() + error.len() + 4);
    body.extend_from_slice(BODY_PREFIX);
    body.extend_from_slice(original);
    body.extend_from_slice(LINE_END);
    body.extend_from_slice(error);
    body.extend_from_slice(LINE_END);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    response
}

/// Loopback HTTP server rendering [`respond`] for every request.
#[derive(Debug)]
pub struct DiagnosticBackend {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl DiagnosticBackend {
    /// Bind an ephemeral loopback port and start serving.
    pub async fn start() -> Result<Self, RelayError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(RelayError::Diagnostic)?;
        let addr = listener.local_addr().map_err(RelayError::Diagnostic)?;

        tracing::debug!(address = %addr, "Diagnostic backend listening");

        let task = tokio::spawn(accept_loop(listener));
        Ok(Self { addr, task })
    }

    /// Address the rewriter sends malformed targets to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and abort every open connection immediately.
    pub async fn close(self) {
        self.task.abort();
        // Dropping the accept loop drops its JoinSet, which aborts the
        // connection tasks with it.
        let _ = self.task.await;
        tracing::debug!(address = %self.addr, "Diagnostic backend closed");
    }
}

async fn accept_loop(listener: TcpListener) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(peer_addr = %peer, "Diagnostic connection accepted");
                    connections.spawn(serve_connection(stream));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Diagnostic backend failed to accept");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(stream: TcpStream) {
    let service = service_fn(|request: Request<Incoming>| async move {
        Ok::<_, Infallible>(respond(request.headers()))
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        tracing::debug!(error = %e, "Diagnostic connection ended with error");
    }
}
