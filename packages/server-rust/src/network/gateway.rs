//! Per-request gateway pipeline.
//!
//! Linear, no branching back:
//!
//! 1. version check (404)
//! 2. documentation short-circuit on `?doc`, any method
//! 3. method check (405)
//! 4. content-type check (415)
//! 5. body decode (415)
//! 6. envelope validation (400)
//! 7. resolve (404)
//! 8. dispatch, then map the `Outcome`
//!
//! Steps 1 to 7 are gateway rejections and never carry the error-source
//! marker.

use std::sync::Arc;

use axum::http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use jinx_core::{decode, Envelope};
use tracing::debug;

use super::auth::request_context;
use super::outcome::{into_response, plain_response};
use crate::rpc::{docs, Dispatcher, ProcedureRegistry};
use crate::traits::Backend;

/// One RPC request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// API version segment of the path.
    pub version: String,
    /// Procedure segment of the path.
    pub procedure: String,
    /// Whether the `doc` query flag is present.
    pub doc: bool,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Composition root: registry + dispatcher + wire rules.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ProcedureRegistry>,
    dispatcher: Dispatcher,
    remote_user_header: String,
}

impl Gateway {
    #[must_use]
    pub fn new(
        registry: Arc<ProcedureRegistry>,
        backend: Arc<dyn Backend>,
        remote_user_header: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dispatcher: Dispatcher::new(backend),
            remote_user_header: remote_user_header.into(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ProcedureRegistry {
        &self.registry
    }

    /// Runs the full pipeline for `request`.
    pub async fn handle(&self, request: GatewayRequest) -> Response {
        if !is_version(&request.version) {
            return plain_response(StatusCode::NOT_FOUND, "Not Found");
        }

        if request.doc {
            return match self.registry.resolve(&request.procedure) {
                Ok(procedure) => plain_response(StatusCode::OK, docs::render(&procedure)),
                Err(err) => plain_response(StatusCode::NOT_FOUND, err.to_string()),
            };
        }

        if request.method != Method::POST {
            let mut response = plain_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "API calls must use POST",
            );
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        if !is_json(&request.headers) {
            return plain_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Request Content-Type must be application/json",
            );
        }

        let body = match decode(&request.body) {
            Ok(body) => body,
            Err(err) => {
                debug!(procedure = %request.procedure, error = %err, "undecodable request body");
                return plain_response(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    format!("Request body could not be parsed as a JSON object: {err}"),
                );
            }
        };

        let envelope = match Envelope::try_from(body) {
            Ok(envelope) => envelope,
            Err(err) => return plain_response(StatusCode::BAD_REQUEST, err.to_string()),
        };

        let procedure = match self.registry.resolve(&request.procedure) {
            Ok(procedure) => procedure,
            Err(err) => return plain_response(StatusCode::NOT_FOUND, err.to_string()),
        };

        let context = request_context(&request.headers, &self.remote_user_header);
        let outcome = self
            .dispatcher
            .dispatch(&procedure, context, envelope.args, envelope.kwargs)
            .await;
        into_response(outcome, procedure.name())
    }
}

/// Version segments are digits, dots and dashes (`1`, `1.0`, `2010-06`).
fn is_version(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

/// Media type check ignoring parameters such as `charset`.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}
