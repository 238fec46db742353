//! Upstream forwarding.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Record the client in `X-Forwarded-For`
//! - Send the rewritten request and stream the response back untouched
//!
//! # Design Decisions
//! - One pooled client shared by every request task
//! - HTTP and HTTPS upstreams through the same rustls connector, with the
//!   `ring` provider named explicitly so other rustls users in the process
//!   cannot make the default ambiguous
//! - Upstream errors are returned once to the caller; nothing is retried
//! - The write timeout covers the streamed response body, not only its head

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, Bytes, HttpBody},
    http::{
        header::{HeaderName, HeaderValue, CONNECTION},
        HeaderMap, Request, Version,
    },
    response::Response,
};
use hyper::body::{Frame, SizeHint};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client, Error as ClientError},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time::{Instant, Sleep};

/// Client used to reach resolved targets and the diagnostic backend.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single transport hop and must not be relayed.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Build the shared upstream client.
pub fn build_client() -> Result<UpstreamClient, rustls::Error> {
    let connector = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append `client` to `X-Forwarded-For`, folding earlier values into one line.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(value) = HeaderValue::try_from(value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Send an already-rewritten request upstream and relay the response.
pub async fn forward(
    client: &UpstreamClient,
    mut request: Request<Body>,
    peer: Option<IpAddr>,
) -> Result<Response, ClientError> {
    strip_hop_by_hop(request.headers_mut());
    if let Some(ip) = peer {
        append_forwarded_for(request.headers_mut(), ip);
    }
    // The client speaks HTTP/1.1 upstream whatever the inbound version was.
    *request.version_mut() = Version::HTTP_11;

    let response = client.request(request).await?;
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    Ok(Response::from_parts(parts, Body::new(body)))
}

/// The response body was still streaming when the write timeout elapsed.
#[derive(Debug, Error)]
#[error("response not written within {0:?}")]
pub struct WriteDeadlineElapsed(pub Duration);

/// Response body that fails once `deadline` passes.
///
/// Each frame is passed through as soon as it is ready; only a body still
/// pending at the deadline is cut off.
pub struct DeadlineBody {
    inner: Body,
    deadline: Pin<Box<Sleep>>,
    limit: Duration,
}

impl DeadlineBody {
    /// `limit` is only reported in the error; `deadline` is what is enforced.
    pub fn new(inner: Body, deadline: Instant, limit: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            limit,
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();
        if let Poll::Ready(frame) = Pin::new(&mut this.inner).poll_frame(cx) {
            return Poll::Ready(frame);
        }

        match this.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Some(Err(axum::Error::new(WriteDeadlineElapsed(
                this.limit,
            ))))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Bound the remainder of `response`'s body by `deadline`.
pub fn limit_body(response: Response, deadline: Instant, limit: Duration) -> Response {
    response.map(|body| Body::new(DeadlineBody::new(body, deadline, limit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    /// A body that never yields a frame.
    struct Stalled;

    impl HttpBody for Stalled {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Poll::Pending
        }
    }

    // metrics-exporter-prometheus brings a second rustls provider into the
    // build, so the process has no unambiguous default.
    #[test]
    fn client_builds_with_explicit_provider() {
        assert!(rustls::crypto::CryptoProvider::get_default().is_none());
        assert!(build_client().is_ok());
    }

    #[tokio::test]
    async fn stalled_body_fails_at_deadline() {
        let limit = Duration::from_millis(50);
        let body = Body::new(DeadlineBody::new(
            Body::new(Stalled),
            Instant::now() + limit,
            limit,
        ));

        let started = std::time::Instant::now();
        let result = axum::body::to_bytes(body, usize::MAX).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn body_finishing_in_time_is_untouched() {
        let limit = Duration::from_secs(1);
        let response = limit_body(
            Response::new(Body::from("hello")),
            Instant::now() + limit,
            limit,
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[test]
    fn strips_standard_and_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-session"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["content-type"], "text/plain");
    }

    #[test]
    fn forwarded_for_is_set_then_appended() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1");

        headers.append(&X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.2"));
        append_forwarded_for(&mut headers, "::1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2, ::1");
        assert_eq!(headers.get_all(&X_FORWARDED_FOR).iter().count(), 1);
    }
}
