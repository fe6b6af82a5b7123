//! Extended JSON codec.
//!
//! Plain JSON maps onto [`Value`] directly. The two extra scalars travel as
//! a JSON object holding exactly one reserved key:
//!
//! ```text
//! {"__jinx_datetime__": "2010-06-01T12:30:45.000123"}
//! {"__jinx_timedelta__": "37:12475000000"}
//! ```
//!
//! The tagged form may appear anywhere a plain scalar may, so instants and
//! intervals survive nesting in lists and mappings up to [`MAX_DEPTH`]
//! containers. Reserved keys are never valid as ordinary mapping keys in
//! either direction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use crate::temporal::{Instant, Interval};
use crate::types::Value;

/// Reserved key tagging an [`Instant`] payload.
pub const DATETIME_KEY: &str = "__jinx_datetime__";
/// Reserved key tagging an [`Interval`] payload.
pub const TIMEDELTA_KEY: &str = "__jinx_timedelta__";

/// Deepest accepted nesting of JSON arrays and objects, tagged scalars
/// included. Decode and encode enforce the same bound.
pub const MAX_DEPTH: usize = 256;

/// Errors raised while decoding or encoding extended JSON.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes are not well-formed JSON.
    #[error("{0}")]
    Syntax(#[from] serde_json::Error),
    #[error("invalid datetime payload {payload}: {reason}")]
    InvalidInstant { payload: String, reason: String },
    #[error("invalid timedelta payload {payload}: {reason}")]
    InvalidInterval { payload: String, reason: String },
    /// A reserved key appeared where an ordinary mapping key was expected.
    #[error("reserved key {key:?} cannot be used as a mapping key")]
    ReservedKey { key: String },
    #[error("float {0} has no JSON representation")]
    NonFiniteFloat(f64),
    #[error("nesting exceeds {} levels", MAX_DEPTH)]
    TooDeep,
    /// Serde could not turn a Rust value into JSON.
    #[error("value of type {type_name} is not JSON serializable: {reason}")]
    Unserializable {
        type_name: &'static str,
        reason: String,
    },
}

/// Decodes extended JSON bytes into a [`Value`].
///
/// # Errors
///
/// Returns [`CodecError::Syntax`] for malformed JSON, and the
/// `InvalidInstant`/`InvalidInterval`/`ReservedKey` variants for tagged
/// scalars that do not parse. Input nested deeper than [`MAX_DEPTH`] fails
/// with [`CodecError::TooDeep`] before it is parsed.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    if nesting_depth(bytes) > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let raw = Json::deserialize(&mut de)?;
    de.end()?;
    lift(raw, 0)
}

/// Encodes a [`Value`] as extended JSON bytes.
///
/// # Errors
///
/// Returns [`CodecError::NonFiniteFloat`] for NaN or infinite floats,
/// [`CodecError::ReservedKey`] for mappings that use a reserved key, and
/// [`CodecError::TooDeep`] past [`MAX_DEPTH`].
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(&lower(value, 0)?)?)
}

/// Same as [`encode`] but returns a `String`.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_to_string(value: &Value) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&lower(value, 0)?)?)
}

impl Value {
    /// Lifts any serde-serializable Rust value into a [`Value`].
    ///
    /// Note that `chrono` types serialize as plain strings through serde;
    /// wrap them in [`Instant`]/[`Interval`] to keep their type on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unserializable`] naming `T` when serde rejects
    /// the value (for example a map with non-string keys).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, CodecError> {
        let raw = serde_json::to_value(value).map_err(|e| CodecError::Unserializable {
            type_name: std::any::type_name::<T>(),
            reason: e.to_string(),
        })?;
        lift(raw, 0)
    }
}

fn is_reserved(key: &str) -> bool {
    key == DATETIME_KEY || key == TIMEDELTA_KEY
}

/// Deepest bracket nesting in `bytes`, ignoring brackets inside strings.
/// Malformed input is left for the parser to reject.
fn nesting_depth(bytes: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for &b in bytes {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Depth of a container opened inside `depth` enclosing ones.
fn enter(depth: usize) -> Result<usize, CodecError> {
    let depth = depth + 1;
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    Ok(depth)
}

fn lift(raw: Json, depth: usize) -> Result<Value, CodecError> {
    Ok(match raw {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => lift_number(&n),
        Json::String(s) => Value::String(s),
        Json::Array(items) => {
            let depth = enter(depth)?;
            Value::Array(
                items
                    .into_iter()
                    .map(|item| lift(item, depth))
                    .collect::<Result<_, _>>()?,
            )
        }
        Json::Object(map) => lift_object(map, enter(depth)?)?,
    })
}

/// Integers outside `i64` (large unsigned values) degrade to floats.
#[allow(clippy::cast_precision_loss)]
fn lift_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else if let Some(u) = n.as_u64() {
        Value::Float(u as f64)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn lift_object(mut map: Map<String, Json>, depth: usize) -> Result<Value, CodecError> {
    let reserved = map.keys().find(|key| is_reserved(key)).cloned();
    match reserved {
        Some(key) if map.len() == 1 => {
            let payload = map.remove(&key).unwrap_or(Json::Null);
            lift_tagged(&key, payload)
        }
        Some(key) => Err(CodecError::ReservedKey { key }),
        None => map
            .into_iter()
            .map(|(k, v)| Ok((k, lift(v, depth)?)))
            .collect::<Result<BTreeMap<_, _>, CodecError>>()
            .map(Value::Map),
    }
}

fn lift_tagged(key: &str, payload: Json) -> Result<Value, CodecError> {
    let is_instant = key == DATETIME_KEY;
    let text = match payload {
        Json::String(text) => text,
        other => {
            let payload = other.to_string();
            let reason = "payload must be a string".to_string();
            return Err(if is_instant {
                CodecError::InvalidInstant { payload, reason }
            } else {
                CodecError::InvalidInterval { payload, reason }
            });
        }
    };

    if is_instant {
        match text.parse::<Instant>() {
            Ok(instant) => Ok(Value::Instant(instant)),
            Err(e) => Err(CodecError::InvalidInstant {
                payload: format!("{text:?}"),
                reason: e.to_string(),
            }),
        }
    } else {
        match text.parse::<Interval>() {
            Ok(interval) => Ok(Value::Interval(interval)),
            Err(e) => Err(CodecError::InvalidInterval {
                payload: format!("{text:?}"),
                reason: e.to_string(),
            }),
        }
    }
}

fn tagged(key: &str, payload: String) -> Json {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), Json::String(payload));
    Json::Object(map)
}

fn lower(value: &Value, depth: usize) -> Result<Json, CodecError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => Json::Number(Number::from_f64(*f).ok_or(CodecError::NonFiniteFloat(*f))?),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => {
            let depth = enter(depth)?;
            Json::Array(
                items
                    .iter()
                    .map(|item| lower(item, depth))
                    .collect::<Result<_, _>>()?,
            )
        }
        Value::Map(map) => {
            let depth = enter(depth)?;
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                if is_reserved(key) {
                    return Err(CodecError::ReservedKey { key: key.clone() });
                }
                out.insert(key.clone(), lower(item, depth)?);
            }
            Json::Object(out)
        }
        Value::Instant(instant) => {
            enter(depth)?;
            tagged(DATETIME_KEY, instant.to_string())
        }
        Value::Interval(interval) => {
            enter(depth)?;
            tagged(TIMEDELTA_KEY, interval.to_string())
        }
    })
}
