//! Procedure descriptors, handler results, and the closed failure taxonomy.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use jinx_core::{CodecError, RequestContext, Value};

use super::binding::BoundArgs;
use crate::traits::Session;

/// Boxed future returned by every registered handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply, ProcedureError>> + Send>>;

type Handler = Arc<dyn Fn(CallContext, BoundArgs) -> HandlerFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// The four business failures a procedure may report.
///
/// Closed on purpose: procedures pick one of these, they never add kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request is well-formed but cannot be honoured as asked (400).
    InvalidRequest,
    /// The named entity does not exist (404).
    NotFound,
    /// The entity exists but is in a state that forbids the change (409).
    Conflict,
    /// The caller may not perform this call (403).
    Forbidden,
}

impl FailureKind {
    #[must_use]
    pub fn status_code(self) -> StatusCode {
        match self {
            FailureKind::InvalidRequest => StatusCode::BAD_REQUEST,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Conflict => StatusCode::CONFLICT,
            FailureKind::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::NotFound => "not_found",
            FailureKind::Conflict => "conflict",
            FailureKind::Forbidden => "forbidden",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ProcedureError {
    /// An expected, named business failure.
    #[error("{kind}: {message}")]
    Failure { kind: FailureKind, message: String },
    /// Anything else. Rendered with its full cause chain.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl ProcedureError {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::Conflict, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::Forbidden, message)
    }
}

impl From<CodecError> for ProcedureError {
    fn from(err: CodecError) -> Self {
        Self::Unhandled(anyhow::Error::new(err))
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Successful handler result.
pub enum Reply {
    /// Encoded with the extended codec and returned as `application/json`.
    Value(Value),
    /// Passed through untouched (apart from the error-source marker).
    Raw(Response),
}

impl Reply {
    /// Shorthand for [`Reply::Value`].
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// A bespoke plain-text response with the given status.
    pub fn raw(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Raw(plain_response(status, body))
    }
}

/// A `text/plain` response with `body`.
#[must_use]
pub fn plain_response(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Reply::Raw(response) => f.debug_tuple("Raw").field(&response.status()).finish(),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Raw(response)
    }
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// What a handler receives besides its arguments.
#[derive(Clone)]
pub struct CallContext {
    /// Caller identity and request id.
    pub request: RequestContext,
    /// Backend session for this call; a transaction is already open on it.
    pub session: Arc<dyn Session>,
}

// ---------------------------------------------------------------------------
// Procedure
// ---------------------------------------------------------------------------

/// Declared parameter of a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Value used when the caller omits the argument. `None` means required.
    pub default: Option<Value>,
}

/// A registered, immutable RPC procedure.
pub struct Procedure {
    name: String,
    params: Vec<Param>,
    variadic: bool,
    docstring: String,
    handler: Handler,
}

impl Procedure {
    /// Starts describing a procedure called `name`.
    pub fn builder(name: impl Into<String>) -> ProcedureBuilder {
        ProcedureBuilder {
            name: name.into(),
            params: Vec::new(),
            variadic: false,
            docstring: String::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Whether surplus positional arguments are collected instead of rejected.
    #[must_use]
    pub fn accepts_variadic(&self) -> bool {
        self.variadic
    }

    #[must_use]
    pub fn docstring(&self) -> &str {
        &self.docstring
    }

    /// Calls the handler. Argument binding must already have succeeded.
    pub(crate) fn invoke(&self, ctx: CallContext, args: BoundArgs) -> HandlerFuture {
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Procedure`]. Signature rules are checked at registration.
#[derive(Debug)]
pub struct ProcedureBuilder {
    name: String,
    params: Vec<Param>,
    variadic: bool,
    docstring: String,
}

impl ProcedureBuilder {
    /// Adds a required parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Adds a parameter with a default value.
    #[must_use]
    pub fn param_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Collects surplus positional arguments into [`BoundArgs::rest`].
    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    #[must_use]
    pub fn doc(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = docstring.into();
        self
    }

    /// Attaches the handler and finishes the procedure.
    pub fn handler<F, Fut>(self, handler: F) -> Procedure
    where
        F: Fn(CallContext, BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, ProcedureError>> + Send + 'static,
    {
        Procedure {
            name: self.name,
            params: self.params,
            variadic: self.variadic,
            docstring: self.docstring,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }
}
