//! Argument binding: maps an envelope's positional and keyword arguments
//! onto a procedure's declared parameters.
//!
//! Rules, in order:
//! 1. positional values fill parameters left to right;
//! 2. surplus positional values go to the variadic tail, or fail;
//! 3. keyword values fill the parameter of the same name, which must exist
//!    and must not already be filled;
//! 4. anything still empty takes its default, or the bind fails.

use std::collections::BTreeMap;

use jinx_core::{Instant, Interval, Value};

use super::procedure::{Procedure, ProcedureError};

/// The call does not fit the procedure's signature.
///
/// The message mirrors a call-arity diagnostic, e.g.
/// `reverse() takes 3 arguments (2 given)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BindError(String);

/// Arguments after a successful bind, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgs {
    procedure: String,
    values: Vec<(String, Value)>,
    rest: Vec<Value>,
}

/// Binds `args` and `kwargs` to `procedure`'s parameters.
///
/// # Errors
///
/// Returns [`BindError`] on arity mismatch, unknown keyword, or a keyword
/// that repeats a positional argument.
pub fn bind(
    procedure: &Procedure,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
) -> Result<BoundArgs, BindError> {
    let params = procedure.params();
    let name = procedure.name();
    let given = args.len() + kwargs.len();

    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    let mut positional = args.into_iter();
    for slot in &mut slots {
        match positional.next() {
            Some(value) => *slot = Some(value),
            None => break,
        }
    }
    let rest: Vec<Value> = positional.collect();
    if !rest.is_empty() && !procedure.accepts_variadic() {
        return Err(arity_error(procedure, given));
    }

    for (key, value) in kwargs {
        let Some(index) = params.iter().position(|p| p.name == key) else {
            return Err(BindError(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        };
        if slots[index].is_some() {
            return Err(BindError(format!(
                "{name}() got multiple values for argument '{key}'"
            )));
        }
        slots[index] = Some(value);
    }

    let mut values = Vec::with_capacity(params.len());
    for (param, slot) in params.iter().zip(slots) {
        match slot.or_else(|| param.default.clone()) {
            Some(value) => values.push((param.name.clone(), value)),
            None => return Err(arity_error(procedure, given)),
        }
    }

    Ok(BoundArgs {
        procedure: name.to_string(),
        values,
        rest,
    })
}

fn arity_error(procedure: &Procedure, given: usize) -> BindError {
    let params = procedure.params();
    let total = params.len();
    let required = params.iter().filter(|p| p.default.is_none()).count();

    let (qualifier, expected) = if procedure.accepts_variadic() {
        ("at least ", required)
    } else if required == total {
        ("", total)
    } else if given > total {
        ("at most ", total)
    } else {
        ("at least ", required)
    };
    let plural = if expected == 1 { "" } else { "s" };

    BindError(format!(
        "{}() takes {qualifier}{expected} argument{plural} ({given} given)",
        procedure.name()
    ))
}

impl BoundArgs {
    /// The bound value of parameter `name`.
    ///
    /// # Errors
    ///
    /// Asking for an undeclared parameter is a handler bug and yields
    /// [`ProcedureError::Unhandled`].
    pub fn get(&self, name: &str) -> Result<&Value, ProcedureError> {
        self.values
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                ProcedureError::Unhandled(anyhow::anyhow!(
                    "{}() has no parameter named '{name}'",
                    self.procedure
                ))
            })
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, ProcedureError> {
        let value = self.get(name)?;
        extract(value).ok_or_else(|| {
            ProcedureError::invalid_request(format!(
                "argument '{name}' of {}() must be {expected}, got {}",
                self.procedure,
                value.kind_name()
            ))
        })
    }

    /// # Errors
    ///
    /// [`ProcedureError::Failure`] (`InvalidRequest`) if the value is not a string.
    pub fn str(&self, name: &str) -> Result<&str, ProcedureError> {
        self.typed(name, "a string", Value::as_str)
    }

    /// # Errors
    ///
    /// [`ProcedureError::Failure`] (`InvalidRequest`) if the value is not an integer.
    pub fn i64(&self, name: &str) -> Result<i64, ProcedureError> {
        self.typed(name, "an integer", Value::as_i64)
    }

    /// # Errors
    ///
    /// [`ProcedureError::Failure`] (`InvalidRequest`) if the value is not a boolean.
    pub fn bool(&self, name: &str) -> Result<bool, ProcedureError> {
        self.typed(name, "a boolean", Value::as_bool)
    }

    /// # Errors
    ///
    /// [`ProcedureError::Failure`] (`InvalidRequest`) if the value is not a datetime.
    pub fn instant(&self, name: &str) -> Result<Instant, ProcedureError> {
        self.typed(name, "a datetime", Value::as_instant)
    }

    /// # Errors
    ///
    /// [`ProcedureError::Failure`] (`InvalidRequest`) if the value is not a timedelta.
    pub fn interval(&self, name: &str) -> Result<Interval, ProcedureError> {
        self.typed(name, "a timedelta", Value::as_interval)
    }

    /// Surplus positional arguments collected by a variadic procedure.
    #[must_use]
    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    /// Declared parameters followed by the variadic tail, in call order.
    #[must_use]
    pub fn into_positional(self) -> Vec<Value> {
        self.values
            .into_iter()
            .map(|(_, value)| value)
            .chain(self.rest)
            .collect()
    }
}
