//! Applying a [`RewriteOutcome`] to the live request.

use std::net::SocketAddr;

use axum::http::{
    header::{HeaderName, HeaderValue, HOST, REFERER},
    uri::{Authority, Scheme},
    Request, Uri,
};

use crate::routing::target::{RewriteOutcome, TargetUrl};

/// Header carrying the parse failure to the diagnostic backend.
pub const X_URL_ERROR: HeaderName = HeaderName::from_static("x-url-error");

/// The request-target as received, e.g. `/http://example.com/a?x=1`.
pub fn original_request_uri<B>(request: &Request<B>) -> &str {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
}

/// Point `request` at the destination chosen by `outcome`.
///
/// Resolved targets become the request URI and `Host`. Failed targets send
/// the request to the diagnostic backend with the original request-target in
/// `Referer` and the reason in `X-URL-Error`.
pub fn apply<B>(
    outcome: &RewriteOutcome,
    request: &mut Request<B>,
    diagnostic_addr: SocketAddr,
) -> Result<(), axum::http::Error> {
    match outcome {
        RewriteOutcome::Resolved(target) => {
            *request.uri_mut() = target_uri(target)?;
            set_host(request, &target.host())?;
        }
        RewriteOutcome::Failed {
            original_request_uri,
            error_description,
        } => {
            let authority = diagnostic_addr.to_string();
            *request.uri_mut() = Uri::builder()
                .scheme(Scheme::HTTP)
                .authority(authority.as_str())
                .path_and_query("/")
                .build()?;
            set_host(request, &authority)?;

            let headers = request.headers_mut();
            headers.insert(REFERER, HeaderValue::try_from(original_request_uri)?);
            headers.insert(X_URL_ERROR, HeaderValue::try_from(error_description)?);
        }
    }
    Ok(())
}

fn target_uri(target: &TargetUrl) -> Result<Uri, axum::http::Error> {
    let authority = Authority::try_from(target.host())?;
    Ok(Uri::builder()
        .scheme(target.scheme())
        .authority(authority)
        .path_and_query(target.path_and_query())
        .build()?)
}

fn set_host<B>(request: &mut Request<B>, host: &str) -> Result<(), axum::http::Error> {
    let value = HeaderValue::try_from(host)?;
    request.headers_mut().insert(HOST, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::target::rewrite;

    fn diagnostic() -> SocketAddr {
        "127.0.0.1:4567".parse().unwrap()
    }

    fn request(target: &str) -> Request<()> {
        Request::builder()
            .uri(target)
            .header(HOST, "relay.local")
            .body(())
            .unwrap()
    }

    #[test]
    fn resolved_target_replaces_uri_and_host() {
        let mut req = request("/http://example.com:8080/a?x=1");
        let outcome = rewrite(original_request_uri(&req));
        apply(&outcome, &mut req, diagnostic()).unwrap();

        assert_eq!(req.uri().to_string(), "http://example.com:8080/a?x=1");
        assert_eq!(req.headers()[HOST], "example.com:8080");
        assert!(req.headers().get(REFERER).is_none());
        assert!(req.headers().get(X_URL_ERROR).is_none());
    }

    #[test]
    fn failed_target_points_at_diagnostic_backend() {
        let mut req = request("/mailto:user@example.com");
        let outcome = rewrite(original_request_uri(&req));
        apply(&outcome, &mut req, diagnostic()).unwrap();

        assert_eq!(req.uri().to_string(), "http://127.0.0.1:4567/");
        assert_eq!(req.headers()[HOST], "127.0.0.1:4567");
        assert_eq!(req.headers()[REFERER], "/mailto:user@example.com");
        assert_eq!(
            req.headers()[X_URL_ERROR],
            "non-hierarchical target URL: user@example.com"
        );
    }

    #[test]
    fn failed_target_overwrites_client_referer() {
        let mut req = request("/http:example.com");
        req.headers_mut()
            .insert(REFERER, HeaderValue::from_static("http://elsewhere/"));
        let outcome = rewrite(original_request_uri(&req));
        apply(&outcome, &mut req, diagnostic()).unwrap();

        assert_eq!(req.headers()[REFERER], "/http:example.com");
        assert_eq!(req.headers().get_all(REFERER).iter().count(), 1);
    }

    #[test]
    fn hostless_target_cannot_be_applied() {
        for target in ["/file:///etc/hosts", "/favicon.ico", "/"] {
            let mut req = request(target);
            let outcome = rewrite(original_request_uri(&req));
            assert!(outcome.is_resolved(), "{}", target);
            assert!(apply(&outcome, &mut req, diagnostic()).is_err(), "{}", target);
        }
    }

    #[test]
    fn resolved_path_is_not_normalized() {
        let mut req = request("/http://example.com/a/../b");
        let outcome = rewrite(original_request_uri(&req));
        apply(&outcome, &mut req, diagnostic()).unwrap();

        assert_eq!(req.uri().to_string(), "http://example.com/a/../b");
    }

    #[test]
    fn failure_text_from_the_request_target_is_a_valid_header() {
        // Anything that reached us as a request-target is visible ASCII.
        let mut req = request("/http://[::1/%ff?q=%zz");
        let outcome = rewrite(original_request_uri(&req));
        assert!(!outcome.is_resolved());
        apply(&outcome, &mut req, diagnostic()).unwrap();

        assert_eq!(req.headers()[REFERER], "/http://[::1/%ff?q=%zz");
        assert!(!req.headers()[X_URL_ERROR].is_empty());
    }
}
