//! `ANY /jinx/{version}/{procedure}`: the RPC endpoint.

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tracing::error;

use super::AppState;
use crate::network::gateway::GatewayRequest;
use crate::network::outcome::plain_response;

/// Hands the request to the gateway pipeline while counting it as in flight.
///
/// The pipeline runs on its own task together with the in-flight guard, so
/// a timed-out or disconnected client never cancels a call between begin
/// and commit/rollback, and draining waits for it. Calls arriving after
/// shutdown began get 503 without reaching a procedure.
pub async fn rpc_handler(
    State(state): State<AppState>,
    Path((version, procedure)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.shutdown.is_accepting() {
        return plain_response(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down");
    }
    let in_flight = state.shutdown.in_flight_guard();

    let request = GatewayRequest {
        method,
        version,
        procedure,
        doc: has_doc_flag(query.as_deref()),
        headers,
        body,
    };
    let gateway = state.gateway;
    let call = tokio::spawn(async move {
        let _in_flight = in_flight;
        gateway.handle(request).await
    });
    match call.await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "gateway task failed");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// `?doc`, `?doc=1` and `?x=1&doc` all count; `?docs` does not.
fn has_doc_flag(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair.split('=').next() == Some("doc"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use anyhow::anyhow;
    use axum::body::{to_bytes, Body};
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;
    use axum::Router;
    use jinx_core::{decode, encode, Instant, Interval, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::network::outcome::has_marker;
    use crate::network::{build_router, Gateway, GatewayConfig, ShutdownController};
    use crate::rpc::{builtin, Procedure, ProcedureError, ProcedureRegistry, Reply};

    fn procedures() -> Vec<Procedure> {
        vec![
            Procedure::builder("normal")
                .doc("Return a fixed greeting.")
                .handler(|_ctx, _args| async { Ok(Reply::value("Hello, world!")) }),
            Procedure::builder("exception").handler(|_ctx, _args| async {
                Err(ProcedureError::Unhandled(
                    anyhow!("'NoneType' has no attribute 'foo'").context("while running exception()"),
                ))
            }),
            Procedure::builder("not_found_response").handler(|_ctx, _args| async {
                Ok(Reply::raw(StatusCode::NOT_FOUND, "Not found."))
            }),
            Procedure::builder("reverse_three_arguments")
                .param("arg1")
                .param("arg2")
                .param("arg3")
                .handler(|_ctx, args| async move {
                    Ok(Reply::value(vec![
                        args.get("arg3")?.clone(),
                        args.get("arg2")?.clone(),
                        args.get("arg1")?.clone(),
                    ]))
                }),
            Procedure::builder("one_default_argument")
                .param_default("arg", "default")
                .handler(|_ctx, args| async move { Ok(Reply::value(args.get("arg")?.clone())) }),
            Procedure::builder("doc_test")
                .param("arg1")
                .param_default("arg2", 3i64)
                .doc("Line one.\n\n    Indented line.")
                .handler(|_ctx, _args| async { Ok(Reply::value(Value::Null)) }),
            Procedure::builder("lock_rack")
                .param("rack")
                .handler(|_ctx, args| async move {
                    Err(ProcedureError::conflict(format!("rack {} is locked", args.str("rack")?)))
                }),
            Procedure::builder("find_host")
                .param("name")
                .handler(|_ctx, args| async move {
                    Err(ProcedureError::not_found(format!("no host named {}", args.str("name")?)))
                }),
            Procedure::builder("explode").handler(|_ctx, _args| async {
                let racks: Vec<u32> = Vec::new();
                Ok(Reply::value(i64::from(racks[3])))
            }),
            Procedure::builder("whoami")
                .handler(|ctx, _args| async move { Ok(Reply::value(ctx.request.user().map(str::to_string))) }),
            Procedure::builder("bad_float")
                .handler(|_ctx, _args| async { Ok(Reply::value(f64::INFINITY)) }),
        ]
    }

    fn app_with(backend: Arc<MemoryBackend>) -> (Router, Arc<ShutdownController>) {
        let mut builder = ProcedureRegistry::builder();
        for procedure in procedures() {
            builder.register(procedure).unwrap();
        }
        let registry = builtin::finish(builder).unwrap();
        let config = GatewayConfig::default();
        let gateway = Gateway::new(Arc::new(registry), backend, config.remote_user_header.clone());
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.set_ready();
        (build_router(gateway, Arc::clone(&shutdown), config), shutdown)
    }

    fn app() -> Router {
        app_with(Arc::new(MemoryBackend::new())).0
    }

    fn post(uri: &str, content_type: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(body.into()).unwrap()
    }

    fn post_json(name: &str, args: Value) -> Request<Body> {
        post(
            &format!("/jinx/1.0/{name}"),
            Some("application/json"),
            encode(&args).unwrap(),
        )
    }

    async fn send(app: Router, request: Request<Body>) -> Response {
        app.oneshot(request).await.unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        decode(&bytes).unwrap()
    }

    /// Rejected by the gateway itself.
    fn assert_gateway_status(response: &Response, status: StatusCode) {
        assert_eq!(response.status(), status);
        assert!(!has_marker(response), "unexpected error-source marker");
    }

    /// Produced by the procedure layer.
    fn assert_call_status(response: &Response, status: StatusCode) {
        assert_eq!(response.status(), status);
        assert!(has_marker(response), "missing error-source marker");
    }

    #[test]
    fn doc_flag_parsing() {
        assert!(has_doc_flag(Some("doc")));
        assert!(has_doc_flag(Some("doc=1")));
        assert!(has_doc_flag(Some("x=1&doc")));
        assert!(!has_doc_flag(Some("docs")));
        assert!(!has_doc_flag(None));
    }

    #[tokio::test]
    async fn invalid_calls_are_rejected_without_marker() {
        let get = Request::get("/jinx/1.0/normal").body(Body::empty()).unwrap();
        let response = send(app(), get).await;
        assert_gateway_status(&response, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "POST");

        let response = send(app(), post("/jinx/1.0/normal", None, Body::empty())).await;
        assert_gateway_status(&response, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = send(
            app(),
            post("/jinx/1.0/normal", Some("application/json"), "This is not valid JSON data."),
        )
        .await;
        assert_gateway_status(&response, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(text(response)
            .await
            .starts_with("Request body could not be parsed as a JSON object: "));

        let response = send(app(), post_json("normal", Value::Int(2))).await;
        assert_gateway_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn normal_call_returns_json() {
        let response = send(app(), post_json("normal", Value::from(Vec::<Value>::new()))).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json(response).await, Value::from("Hello, world!"));
    }

    #[tokio::test]
    async fn unhandled_error_is_500_with_trace() {
        let response = send(app(), post_json("exception", Value::from(Vec::<Value>::new()))).await;
        assert_call_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
        let body = text(response).await;
        assert!(body.contains("while running exception()"));
        assert!(body.contains("has no attribute 'foo'"));
    }

    #[tokio::test]
    async fn raw_404_carries_marker() {
        let response = send(app(), post_json("not_found_response", Value::from(Vec::<Value>::new()))).await;
        assert_call_status(&response, StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "Not found.");
    }

    #[tokio::test]
    async fn nonexistent_call_is_404_without_marker() {
        let response = send(app(), post_json("nonexistentcallblahblah", Value::from(Vec::<Value>::new()))).await;
        assert_gateway_status(&response, StatusCode::NOT_FOUND);

        let response = send(app(), post("/jinx/latest/normal", Some("application/json"), "[]")).await;
        assert_gateway_status(&response, StatusCode::NOT_FOUND);

        let response = send(app(), post("/elsewhere", Some("application/json"), "[]")).await;
        assert_gateway_status(&response, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn positional_arguments() {
        let args = Value::from(vec![Value::Int(1), Value::Int(2), Value::from("3")]);
        let response = send(app(), post_json("reverse_three_arguments", args)).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(
            json(response).await,
            Value::from(vec![Value::from("3"), Value::Int(2), Value::Int(1)])
        );

        let response = send(app(), post_json("ping", Value::from(vec![1i64]))).await;
        assert_eq!(json(response).await, Value::from(vec![1i64]));

        let response = send(app(), post_json("ping", Value::from(vec![1i64, 2, 3]))).await;
        assert_eq!(json(response).await, Value::from(vec![1i64, 2, 3]));

        let response = send(app(), post_json("reverse_three_arguments", Value::from(vec![1i64, 2]))).await;
        assert_call_status(&response, StatusCode::BAD_REQUEST);

        let response = send(app(), post_json("reverse_three_arguments", Value::from(vec![1i64, 2, 3, 4]))).await;
        assert_call_status(&response, StatusCode::BAD_REQUEST);
        assert_eq!(
            text(response).await,
            "reverse_three_arguments() takes 3 arguments (4 given)"
        );
    }

    #[tokio::test]
    async fn default_arguments() {
        let response = send(app(), post_json("one_default_argument", Value::from(vec!["testarg"]))).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(json(response).await, Value::from("testarg"));

        let response = send(app(), post_json("one_default_argument", Value::from(Vec::<Value>::new()))).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(json(response).await, Value::from("default"));

        let response = send(app(), post_json("one_default_argument", Value::from(vec![1i64, 2]))).await;
        assert_call_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn keyword_arguments() {
        let body = r#"{"args": [1], "kwargs": {"arg3": "c", "arg2": "b"}}"#;
        let response = send(
            app(),
            post("/jinx/1.0/reverse_three_arguments", Some("application/json"), body),
        )
        .await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(
            json(response).await,
            Value::from(vec![Value::from("c"), Value::from("b"), Value::Int(1)])
        );

        let body = r#"{"args": [], "kwargs": {"nope": 1}}"#;
        let response = send(
            app(),
            post("/jinx/1.0/one_default_argument", Some("application/json"), body),
        )
        .await;
        assert_call_status(&response, StatusCode::BAD_REQUEST);

        let body = r#"{"args": ["a"], "kwargs": {"arg": "b"}}"#;
        let response = send(
            app(),
            post("/jinx/1.0/one_default_argument", Some("application/json"), body),
        )
        .await;
        assert_call_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deeply_nested_arguments_are_accepted() {
        let mut value = Value::from(Instant::now());
        for _ in 0..200 {
            value = Value::Array(vec![value]);
        }
        let args = Value::Array(vec![value]);

        let response = send(app(), post_json("ping", args.clone())).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(json(response).await, args);
    }

    #[tokio::test]
    async fn extended_values_round_trip_through_nesting() {
        let now = Instant::now();
        let delta = Interval::from_days_seconds(21, 1_394_875).unwrap();

        let response = send(app(), post_json("ping", Value::from(vec![now]))).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(json(response).await, Value::from(vec![now]));

        let response = send(app(), post_json("ping", Value::from(vec![delta]))).await;
        assert_eq!(json(response).await, Value::from(vec![delta]));

        let nested = Value::from(vec![Value::from(vec![
            Value::from(vec![Value::from(vec![Value::from(vec![Value::from(vec![
                Value::from(BTreeMap::from([("1".to_string(), Value::from(now))])),
            ])])])]),
            Value::from(BTreeMap::from([("2".to_string(), Value::from(delta))])),
        ])]);
        let response = send(app(), post_json("ping", nested.clone())).await;
        assert_gateway_status(&response, StatusCode::OK);
        assert_eq!(json(response).await, nested);
    }

    #[tokio::test]
    async fn documentation_for_get_and_post() {
        let expected = "doc_test(arg1, arg2=3):\nLine one.\n\n    Indented line.";

        let get = Request::get("/jinx/1.0/doc_test?doc").body(Body::empty()).unwrap();
        let response = send(app(), get).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(text(response).await, expected);

        let response = send(app(), post_json("doc_test?doc", Value::from(vec![1i64]))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, expected);

        let get = Request::get("/jinx/1.0/nonexistent?doc").body(Body::empty()).unwrap();
        let response = send(app(), get).await;
        assert_gateway_status(&response, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn business_errors_map_to_statuses() {
        let response = send(app(), post_json("lock_rack", Value::from(vec!["r12"]))).await;
        assert_call_status(&response, StatusCode::CONFLICT);
        assert_eq!(text(response).await, "rack r12 is locked");

        let response = send(app(), post_json("find_host", Value::from(vec!["db1"]))).await;
        assert_call_status(&response, StatusCode::NOT_FOUND);

        let response = send(app(), post_json("lock_rack", Value::from(vec![7i64]))).await;
        assert_call_status(&response, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unserializable_result_is_500_with_marker() {
        let response = send(app(), post_json("bad_float", Value::from(Vec::<Value>::new()))).await;
        assert_call_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(response)
            .await
            .starts_with("bad_float returned unserializable data: "));
    }

    #[tokio::test]
    async fn no_transaction_survives_any_call() {
        let backend = Arc::new(MemoryBackend::new());
        let calls = [
            ("normal", Value::from(Vec::<Value>::new())),
            ("exception", Value::from(Vec::<Value>::new())),
            ("explode", Value::from(Vec::<Value>::new())),
            ("lock_rack", Value::from(vec!["r1"])),
            ("reverse_three_arguments", Value::from(vec![1i64])),
        ];
        for (name, args) in calls {
            let (router, _) = app_with(Arc::clone(&backend));
            let _ = send(router, post_json(name, args)).await;
            assert_eq!(backend.active_transactions(), 0, "{name} left a transaction open");
        }
        let stats = backend.stats();
        assert_eq!(stats.begun, 4);
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.rolled_back, 3);
    }

    #[tokio::test]
    async fn panicking_procedure_is_500_with_marker() {
        let response = send(app(), post_json("explode", Value::from(Vec::<Value>::new()))).await;
        assert_call_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(response).await.contains("explode() panicked"));
    }

    #[tokio::test]
    async fn remote_user_becomes_principal() {
        let mut request = post_json("whoami", Value::from(Vec::<Value>::new()));
        request
            .headers_mut()
            .insert("x-remote-user", "alice@EXAMPLE.COM".parse().unwrap());
        let response = send(app(), request).await;
        assert_eq!(json(response).await, Value::from("alice"));

        let response = send(app(), post_json("whoami", Value::from(Vec::<Value>::new()))).await;
        assert_eq!(json(response).await, Value::Null);
    }

    #[tokio::test]
    async fn draining_gateway_refuses_new_calls() {
        let (router, shutdown) = app_with(Arc::new(MemoryBackend::new()));
        shutdown.trigger_shutdown();
        let response = send(router, post_json("normal", Value::from(Vec::<Value>::new()))).await;
        assert_gateway_status(&response, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_routes_are_mounted() {
        let response = send(app(), Request::get("/health/live").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(app(), Request::get("/health/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
