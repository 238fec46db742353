//! Target extraction.
//!
//! The relay has no route table: the destination of every request is the
//! request-target itself, minus its leading `/`. A request for
//! `/http://example.com/foo?q=1` is relayed to `http://example.com/foo?q=1`.
//!
//! The remainder is read as an RFC 3986 reference. `scheme:` followed by
//! anything other than `/` is opaque and cannot be forwarded. Without an
//! authority (`//host`) the target is hostless: it resolves, but there is
//! nowhere to send it. Path and query are kept byte for byte; only the
//! authority goes through the `url` parser, which validates and normalizes
//! the host.

use url::Url;

/// Scheme assumed when the embedded target does not name one.
pub const DEFAULT_SCHEME: &str = "http";

/// A forwarding destination parsed out of a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    scheme: String,
    host: String,
    path: String,
    query: Option<String>,
}

impl TargetUrl {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host and, when it is not the scheme default, port (`example.com:8080`).
    /// Empty for targets without an authority.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path exactly as it appeared in the request.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Path and query in request-target form (`/a?x=1`).
    pub fn path_and_query(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        match &self.query {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        }
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.is_empty() {
            write!(f, "{}:{}", self.scheme, self.path)?;
        } else {
            write!(f, "{}://{}{}", self.scheme, self.host, self.path)?;
        }
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// Result of extracting the destination from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The request path held a hierarchical URL.
    Resolved(TargetUrl),
    /// The request path could not be used as a destination.
    Failed {
        /// The request-target exactly as received, leading `/` included.
        original_request_uri: String,
        /// Human-readable reason, never empty.
        error_description: String,
    },
}

impl RewriteOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RewriteOutcome::Resolved(_))
    }
}

/// Extract the destination embedded in `original_request_uri`.
///
/// Pure: the outcome depends only on the input, so it is safe to call from
/// any number of request tasks at once.
pub fn rewrite(original_request_uri: &str) -> RewriteOutcome {
    let mut chars = original_request_uri.chars();
    chars.next();

    match parse_target(chars.as_str()) {
        Ok(target) => RewriteOutcome::Resolved(target),
        Err(description) => RewriteOutcome::Failed {
            original_request_uri: original_request_uri.to_string(),
            error_description: description,
        },
    }
}

fn parse_target(remainder: &str) -> Result<TargetUrl, String> {
    // Fragments are never part of what gets forwarded.
    let remainder = remainder.split('#').next().unwrap_or_default();
    let (reference, query) = match remainder.split_once('?') {
        Some((reference, query)) => (reference, Some(query.to_string())),
        None => (remainder, None),
    };

    let (scheme, rest) = match split_scheme(reference)? {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => {
            let first_segment = reference.split('/').next().unwrap_or_default();
            if first_segment.contains(':') {
                return Err("first path segment in URL cannot contain colon".to_string());
            }
            (DEFAULT_SCHEME.to_string(), reference)
        }
    };

    // Parse errors are settled above; only a well-formed reference is
    // classified as opaque.
    if !rest.is_empty() && !rest.starts_with('/') {
        return Err(format!("non-hierarchical target URL: {}", rest));
    }

    let (host, path) = match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find('/').unwrap_or(after.len());
            let (authority, path) = after.split_at(end);
            (parse_host(&scheme, authority)?, path)
        }
        None => (String::new(), rest),
    };
    check_escapes(path)?;

    Ok(TargetUrl {
        scheme,
        host,
        path: path.to_string(),
        query,
    })
}

/// Split a leading `scheme:` off `reference`, if it has one.
fn split_scheme(reference: &str) -> Result<Option<(&str, &str)>, String> {
    for (i, c) in reference.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if i > 0 => {}
            ':' if i == 0 => return Err("missing protocol scheme".to_string()),
            ':' => return Ok(Some((&reference[..i], &reference[i + 1..]))),
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Validate an authority, returning `host[:port]` without any userinfo.
fn parse_host(scheme: &str, authority: &str) -> Result<String, String> {
    if authority.is_empty() {
        return Ok(String::new());
    }

    let url = Url::parse(&format!("{}://{}/", scheme, authority)).map_err(|e| e.to_string())?;
    Ok(match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    })
}

fn check_escapes(path: &str) -> Result<(), String> {
    let bytes = path.as_bytes();
    for (i, _) in path.match_indices('%') {
        let valid = bytes.get(i + 1..i + 3).is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            let escape: String = path[i..].chars().take(3).collect();
            return Err(format!("invalid URL escape {:?}", escape));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(target: &str) -> TargetUrl {
        match rewrite(target) {
            RewriteOutcome::Resolved(url) => url,
            other => panic!("expected {:?} to resolve, got {:?}", target, other),
        }
    }

    fn failed(target: &str) -> (String, String) {
        match rewrite(target) {
            RewriteOutcome::Failed {
                original_request_uri,
                error_description,
            } => (original_request_uri, error_description),
            other => panic!("expected {:?} to fail, got {:?}", target, other),
        }
    }

    #[test]
    fn resolves_absolute_target() {
        let url = resolved("/http://example.com/a?x=1");
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.path(), "/a");
        assert_eq!(url.query(), Some("x=1"));
        assert_eq!(url.to_string(), "http://example.com/a?x=1");
    }

    #[test]
    fn keeps_scheme_and_port() {
        let url = resolved("/https://example.com:8443/deep/path");
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host(), "example.com:8443");
        assert_eq!(url.path_and_query(), "/deep/path");
    }

    #[test]
    fn default_port_and_userinfo_are_not_part_of_host() {
        assert_eq!(resolved("/http://example.com:80/").host(), "example.com");
        assert_eq!(resolved("/http://user:pw@example.com/").host(), "example.com");
        assert_eq!(resolved("/http://[::1]:8080/").host(), "[::1]:8080");
    }

    #[test]
    fn path_is_forwarded_verbatim() {
        let url = resolved("/http://example.com/a/../b/%2F?q=a%20b");
        assert_eq!(url.path(), "/a/../b/%2F");
        assert_eq!(url.query(), Some("q=a%20b"));
    }

    #[test]
    fn authority_only_target_gets_root_path() {
        let url = resolved("/http://example.com?x=1");
        assert_eq!(url.path(), "");
        assert_eq!(url.path_and_query(), "/?x=1");
    }

    #[test]
    fn scheme_relative_target_defaults_to_http() {
        let url = resolved("///example.com/bar");
        assert_eq!(url.scheme(), DEFAULT_SCHEME);
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.path(), "/bar");
    }

    #[test]
    fn schemeless_path_stays_hostless() {
        let url = resolved("/favicon.ico");
        assert_eq!(url.scheme(), DEFAULT_SCHEME);
        assert_eq!(url.host(), "");
        assert_eq!(url.path(), "favicon.ico");

        let url = resolved("/example.com/foo?q=1");
        assert_eq!(url.host(), "");
        assert_eq!(url.path(), "example.com/foo");
        assert_eq!(url.query(), Some("q=1"));
    }

    #[test]
    fn bare_separator_is_hostless() {
        let url = resolved("/");
        assert_eq!(url.host(), "");
        assert_eq!(url.path(), "");
    }

    #[test]
    fn opaque_target_fails_with_original_uri() {
        let (original, description) = failed("/mailto:user@example.com");
        assert_eq!(original, "/mailto:user@example.com");
        assert_eq!(description, "non-hierarchical target URL: user@example.com");
    }

    #[test]
    fn special_schemes_without_slash_are_opaque() {
        let (original, description) = failed("/http:example.com/a");
        assert_eq!(original, "/http:example.com/a");
        assert_eq!(description, "non-hierarchical target URL: example.com/a");

        let (_, description) = failed("/https:host");
        assert_eq!(description, "non-hierarchical target URL: host");
    }

    #[test]
    fn unparseable_targets_fail() {
        let (original, description) = failed("/http://[::1/");
        assert_eq!(original, "/http://[::1/");
        assert!(!description.is_empty());

        assert_eq!(failed("/:8080/x").1, "missing protocol scheme");
        assert_eq!(
            failed("/1http://x").1,
            "first path segment in URL cannot contain colon"
        );
        assert_eq!(failed("/http://example.com/%zz").1, "invalid URL escape \"%zz\"");
        assert_eq!(failed("/a%é").1, "invalid URL escape \"%é\"");
        assert!(!failed("/http://example.com:99999/").1.is_empty());
    }

    #[test]
    fn rewrite_is_deterministic() {
        for target in ["/http://example.com/a?x=1", "/mailto:a@b", "/", "/http://[x"] {
            assert_eq!(rewrite(target), rewrite(target));
        }
    }
}
