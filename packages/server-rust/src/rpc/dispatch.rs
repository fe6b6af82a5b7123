//! Dispatcher: bind, invoke under a transaction, classify.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use futures_util::FutureExt;
use jinx_core::{RequestContext, Value};
use tracing::{debug, info_span, warn, Instrument};

use super::binding::{bind, BoundArgs};
use super::procedure::{CallContext, FailureKind, Procedure, ProcedureError, Reply};
use super::transaction::run_in_transaction;
use crate::traits::Backend;

/// Result of one dispatch attempt. Exactly one variant per call.
#[derive(Debug)]
pub enum Outcome {
    Success(Reply),
    /// The arguments did not fit the signature; the handler never ran.
    ArgumentBindingError(String),
    BusinessError { kind: FailureKind, message: String },
    /// Diagnostic trace of an unexpected failure.
    UnhandledFailure(String),
}

impl Outcome {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::ArgumentBindingError(_) => "binding_error",
            Outcome::BusinessError { kind, .. } => kind.as_str(),
            Outcome::UnhandledFailure(_) => "unhandled",
        }
    }
}

impl From<Result<Reply, ProcedureError>> for Outcome {
    fn from(result: Result<Reply, ProcedureError>) -> Self {
        match result {
            Ok(reply) => Outcome::Success(reply),
            Err(ProcedureError::Failure { kind, message }) => Outcome::BusinessError { kind, message },
            Err(ProcedureError::Unhandled(err)) => Outcome::UnhandledFailure(format!("{err:?}")),
        }
    }
}

pub const CALLS_TOTAL: &str = "jinx_rpc_calls_total";
pub const CALL_DURATION: &str = "jinx_rpc_duration_seconds";

/// Registers descriptions for the dispatch metrics with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(CALLS_TOTAL, "Procedure calls by procedure and outcome");
    metrics::describe_histogram!(
        CALL_DURATION,
        metrics::Unit::Seconds,
        "Procedure call latency, binding through commit or rollback"
    );
}

/// Invokes procedures against a backend, one session per call.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Binds `args`/`kwargs` to `procedure`, runs it under the transaction
    /// guard, and classifies the result.
    pub async fn dispatch(
        &self,
        procedure: &Procedure,
        request: RequestContext,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Outcome {
        let span = info_span!(
            "rpc_call",
            procedure = procedure.name(),
            request_id = %request.request_id,
            user = request.user().unwrap_or("-"),
            outcome = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let outcome = self.dispatch_inner(procedure, request, args, kwargs).await;
            let elapsed = start.elapsed();

            let span = tracing::Span::current();
            span.record("outcome", outcome.label());
            span.record(
                "duration_ms",
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            );

            metrics::counter!(
                CALLS_TOTAL,
                "procedure" => procedure.name().to_string(),
                "outcome" => outcome.label(),
            )
            .increment(1);
            metrics::histogram!(
                CALL_DURATION,
                "procedure" => procedure.name().to_string(),
            )
            .record(elapsed.as_secs_f64());

            match &outcome {
                Outcome::UnhandledFailure(trace) => warn!(%trace, "procedure failed"),
                other => debug!(outcome = other.label(), "procedure finished"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch_inner(
        &self,
        procedure: &Procedure,
        request: RequestContext,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Outcome {
        let bound = match bind(procedure, args, kwargs) {
            Ok(bound) => bound,
            Err(err) => return Outcome::ArgumentBindingError(err.to_string()),
        };

        let session = match self.backend.session().await {
            Ok(session) => session,
            Err(err) => {
                return Outcome::UnhandledFailure(format!(
                    "{:?}",
                    err.context("failed to check out a backend session")
                ))
            }
        };

        let ctx = CallContext {
            request,
            session: Arc::clone(&session),
        };
        run_in_transaction(session.as_ref(), || invoke(procedure, ctx, bound))
            .await
            .into()
    }
}

/// Runs the handler, turning a panic into an unhandled failure so the
/// transaction guard still rolls back.
async fn invoke(procedure: &Procedure, ctx: CallContext, args: BoundArgs) -> Result<Reply, ProcedureError> {
    let call = AssertUnwindSafe(async move { procedure.invoke(ctx, args).await });
    match call.catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(ProcedureError::Unhandled(anyhow!(
                "{}() panicked: {message}",
                procedure.name()
            )))
        }
    }
}
