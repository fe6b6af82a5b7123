//! Outcome to HTTP response mapping and the error-source marker.
//!
//! A response carries `X-Jinx-Error-Source: api` exactly when the procedure
//! layer produced it. Gateway rejections (method, content type, body,
//! envelope, unknown procedure) never do.

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use jinx_core::encode;

pub use crate::rpc::plain_response;
use crate::rpc::{Outcome, Reply};

pub const ERROR_SOURCE_HEADER: &str = "x-jinx-error-source";
pub const ERROR_SOURCE_API: &str = "api";

const APPLICATION_JSON: &str = "application/json";

/// Tags `response` as coming from the procedure layer.
#[must_use]
pub fn with_marker(mut response: Response) -> Response {
    response.headers_mut().insert(
        HeaderName::from_static(ERROR_SOURCE_HEADER),
        HeaderValue::from_static(ERROR_SOURCE_API),
    );
    response
}

/// Whether `response` carries the error-source marker.
#[must_use]
pub fn has_marker(response: &Response) -> bool {
    response
        .headers()
        .get(ERROR_SOURCE_HEADER)
        .is_some_and(|v| v == ERROR_SOURCE_API)
}

/// Turns the dispatch result for `procedure` into the wire response.
#[must_use]
pub fn into_response(outcome: Outcome, procedure: &str) -> Response {
    match outcome {
        Outcome::Success(Reply::Raw(response)) => with_marker(response),
        Outcome::Success(Reply::Value(value)) => match encode(&value) {
            Ok(bytes) => {
                let mut response = Response::new(Body::from(bytes));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                response
            }
            Err(err) => with_marker(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{procedure} returned unserializable data: {err}"),
            )),
        },
        Outcome::ArgumentBindingError(message) => {
            with_marker(plain_response(StatusCode::BAD_REQUEST, message))
        }
        Outcome::BusinessError { kind, message } => {
            with_marker(plain_response(kind.status_code(), message))
        }
        Outcome::UnhandledFailure(trace) => {
            with_marker(plain_response(StatusCode::INTERNAL_SERVER_ERROR, trace))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::rpc::FailureKind;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn success_value_is_json_without_marker() {
        let response = into_response(Outcome::Success(Reply::value(vec![1i64, 2])), "f");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], APPLICATION_JSON);
        assert!(!has_marker(&response));
        assert_eq!(body_text(response).await, "[1,2]");
    }

    #[tokio::test]
    async fn unserializable_value_is_500_with_marker() {
        let response = into_response(Outcome::Success(Reply::value(f64::NAN)), "bad_float");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(has_marker(&response));
        assert!(body_text(response)
            .await
            .starts_with("bad_float returned unserializable data: "));
    }

    #[test]
    fn raw_reply_passes_through_with_marker() {
        let raw = Reply::raw(StatusCode::NOT_FOUND, "no such rack");
        let response = into_response(Outcome::Success(raw), "rack");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(has_marker(&response));
    }

    #[test]
    fn failures_map_to_statuses_with_marker() {
        let cases = [
            (Outcome::ArgumentBindingError("f() takes 1 argument (0 given)".into()), StatusCode::BAD_REQUEST),
            (
                Outcome::BusinessError { kind: FailureKind::Conflict, message: "locked".into() },
                StatusCode::CONFLICT,
            ),
            (
                Outcome::BusinessError { kind: FailureKind::Forbidden, message: "no".into() },
                StatusCode::FORBIDDEN,
            ),
            (Outcome::UnhandledFailure("trace".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (outcome, status) in cases {
            let response = into_response(outcome, "f");
            assert_eq!(response.status(), status);
            assert!(has_marker(&response));
            assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        }
    }

    #[test]
    fn plain_responses_have_no_marker() {
        let response = plain_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "nope");
        assert!(!has_marker(&response));
    }
}
