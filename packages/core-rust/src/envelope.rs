//! Request envelope: the decoded body of an RPC call.
//!
//! Two shapes are accepted:
//!
//! * a list of positional arguments: `[1, "two"]`
//! * an object with exactly `args` and `kwargs`:
//!   `{"args": [1], "kwargs": {"name": "two"}}`

use std::collections::BTreeMap;

use crate::types::Value;

/// Positional and keyword arguments for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

/// The decoded body is not an accepted envelope shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Expected a list of arguments or an object with \"args\" and \"kwargs\"; got {0}")]
    Shape(&'static str),
    #[error("\"args\" must be a list; got {0}")]
    Args(&'static str),
    #[error("\"kwargs\" must be a mapping; got {0}")]
    Kwargs(&'static str),
}

impl Envelope {
    /// Positional-only envelope.
    #[must_use]
    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: BTreeMap::new(),
        }
    }
}

impl TryFrom<Value> for Envelope {
    type Error = EnvelopeError;

    fn try_from(body: Value) -> Result<Self, Self::Error> {
        match body {
            Value::Array(args) => Ok(Self::positional(args)),
            Value::Map(mut map)
                if map.len() == 2 && map.contains_key("args") && map.contains_key("kwargs") =>
            {
                let args = match map.remove("args") {
                    Some(Value::Array(args)) => args,
                    Some(other) => return Err(EnvelopeError::Args(other.kind_name())),
                    None => return Err(EnvelopeError::Args("nothing")),
                };
                let kwargs = match map.remove("kwargs") {
                    Some(Value::Map(kwargs)) => kwargs,
                    Some(other) => return Err(EnvelopeError::Kwargs(other.kind_name())),
                    None => return Err(EnvelopeError::Kwargs("nothing")),
                };
                Ok(Self { args, kwargs })
            }
            other => Err(EnvelopeError::Shape(other.kind_name())),
        }
    }
}
