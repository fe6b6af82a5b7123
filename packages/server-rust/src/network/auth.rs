//! Request context extraction from trusted edge headers.
//!
//! Authentication happens in front of the gateway (a Kerberos-terminating
//! proxy or similar). The proxy forwards the authenticated user in a header;
//! the gateway only parses it and never enforces anything.

use axum::http::HeaderMap;
use jinx_core::{Principal, RequestContext};
use tracing::debug;
use uuid::Uuid;

use super::middleware::REQUEST_ID_HEADER;

/// Builds the per-request context from `headers`.
///
/// The request id comes from `X-Request-Id`, or is a fresh UUID when the
/// gateway runs without the middleware stack. The principal comes from
/// `remote_user_header`; a missing, non-UTF-8, or empty value yields an
/// anonymous context.
#[must_use]
pub fn request_context(headers: &HeaderMap, remote_user_header: &str) -> RequestContext {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let principal = headers
        .get(remote_user_header)
        .and_then(|v| v.to_str().ok())
        .and_then(Principal::from_remote_user);

    if principal.is_none() && headers.contains_key(remote_user_header) {
        debug!(header = remote_user_header, "ignoring unusable remote user header");
    }

    RequestContext::new(request_id, principal)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn principal_and_request_id_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("abc-123"));
        headers.insert("x-remote-user", HeaderValue::from_static("alice@EXAMPLE.COM"));

        let ctx = request_context(&headers, "x-remote-user");
        assert_eq!(ctx.request_id, "abc-123");
        assert_eq!(ctx.user(), Some("alice"));
        assert_eq!(
            ctx.principal.and_then(|p| p.realm).as_deref(),
            Some("EXAMPLE.COM")
        );
    }

    #[test]
    fn custom_header_name() {
        let mut headers = HeaderMap::new();
        headers.insert("remote-user", HeaderValue::from_static("bob"));
        assert_eq!(request_context(&headers, "remote-user").user(), Some("bob"));
        assert_eq!(request_context(&headers, "x-remote-user").user(), None);
    }

    #[test]
    fn empty_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert("x-remote-user", HeaderValue::from_static(""));
        let ctx = request_context(&headers, "x-remote-user");
        assert!(ctx.principal.is_none());
        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }
}
