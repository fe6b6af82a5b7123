//! Procedure layer: everything between a decoded envelope and an `Outcome`.
//!
//! 1. **Registry** (`registry`): name -> `Procedure`, fixed at startup
//! 2. **Binding** (`binding`): envelope arguments -> declared parameters
//! 3. **Transaction guard** (`transaction`): begin/commit/rollback per call
//! 4. **Dispatch** (`dispatch`): bind, invoke, classify into an `Outcome`
//! 5. **Docs** (`docs`): signature line and trimmed docstring

pub mod binding;
pub mod builtin;
pub mod dispatch;
pub mod docs;
pub mod procedure;
pub mod registry;
pub mod transaction;

pub use binding::{bind, BindError, BoundArgs};
pub use dispatch::{describe_metrics, Dispatcher, Outcome};
pub use procedure::{
    plain_response, CallContext, FailureKind, HandlerFuture, Param, Procedure, ProcedureBuilder,
    ProcedureError, Reply,
};
pub use registry::{ProcedureRegistry, RegistryBuilder, RegistryError};
pub use transaction::run_in_transaction;
