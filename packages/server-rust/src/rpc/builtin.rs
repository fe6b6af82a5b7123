//! Procedures every gateway exposes regardless of the domain set.

use std::sync::Arc;

use jinx_core::Value;

use super::procedure::{Procedure, Reply};
use super::registry::{ProcedureRegistry, RegistryBuilder, RegistryError};

pub const PING: &str = "ping";
pub const LIST_CALLS: &str = "list_calls";

/// Echoes its arguments back as a list.
#[must_use]
pub fn ping() -> Procedure {
    Procedure::builder(PING)
        .variadic()
        .doc(
            "
            Echo the given arguments back as a list.

            Useful as a connectivity check: extended values come back in
            exactly the form they were sent.",
        )
        .handler(|_ctx, args| async move { Ok(Reply::value(args.into_positional())) })
}

/// Lists `names` in sorted order.
#[must_use]
pub fn list_calls(names: Vec<String>) -> Procedure {
    let names: Arc<[String]> = names.into();
    Procedure::builder(LIST_CALLS)
        .doc("Return the names of all procedures this gateway serves.")
        .handler(move |_ctx, _args| {
            let names = Arc::clone(&names);
            async move {
                Ok(Reply::value(
                    names.iter().map(|n| Value::from(n.as_str())).collect::<Value>(),
                ))
            }
        })
}

/// Adds the built-in procedures to `builder` and finishes the registry.
///
/// `list_calls` sees every name registered before this call, itself
/// included.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if a domain procedure already uses a
/// built-in name.
pub fn finish(mut builder: RegistryBuilder) -> Result<ProcedureRegistry, RegistryError> {
    builder.register(ping())?;
    let mut names = builder.names();
    names.push(LIST_CALLS.to_string());
    names.sort();
    builder.register(list_calls(names))?;
    Ok(builder.build())
}
