//! Procedure registry: name -> [`Procedure`], validated and frozen at startup.
//!
//! Registration goes through [`RegistryBuilder`]; the built
//! [`ProcedureRegistry`] is read-only and shared behind an `Arc`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::procedure::Procedure;

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No procedure is registered under the requested name.
    #[error("no procedure named '{0}'")]
    NotFound(String),
    /// A second procedure tried to claim an existing name.
    #[error("procedure '{0}' is already registered")]
    Duplicate(String),
    /// The procedure's declared signature is malformed.
    #[error("procedure '{name}' has an invalid signature: {reason}")]
    InvalidSignature { name: String, reason: String },
}

// ---------------------------------------------------------------------------
// ProcedureRegistry
// ---------------------------------------------------------------------------

/// Read-only mapping from path name to procedure.
///
/// Populated once through [`RegistryBuilder`] at startup and shared behind an
/// `Arc` afterwards; lookups never mutate it.
#[derive(Debug, Default)]
pub struct ProcedureRegistry {
    procedures: BTreeMap<String, Arc<Procedure>>,
}

impl ProcedureRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up the procedure registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unregistered name.
    pub fn resolve(&self, name: &str) -> Result<Arc<Procedure>, RegistryError> {
        self.procedures
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.procedures.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Collects procedures at startup. Every registration is validated eagerly so
/// that a bad signature fails the boot, not the first request.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    procedures: BTreeMap<String, Arc<Procedure>>,
}

impl RegistryBuilder {
    /// Adds `procedure` under its own name.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::Duplicate`] if the name is taken.
    /// * [`RegistryError::InvalidSignature`] if the name is not a valid path
    ///   segment, a parameter name repeats, or a required parameter follows
    ///   one with a default.
    pub fn register(&mut self, procedure: Procedure) -> Result<(), RegistryError> {
        validate(&procedure)?;
        let name = procedure.name().to_string();
        if self.procedures.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.procedures.insert(name, Arc::new(procedure));
        Ok(())
    }

    /// Chaining form of [`RegistryBuilder::register`].
    ///
    /// # Errors
    ///
    /// Same as [`RegistryBuilder::register`].
    pub fn with(mut self, procedure: Procedure) -> Result<Self, RegistryError> {
        self.register(procedure)?;
        Ok(self)
    }

    /// Names registered so far, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.procedures.keys().cloned().collect()
    }

    #[must_use]
    pub fn build(self) -> ProcedureRegistry {
        ProcedureRegistry {
            procedures: self.procedures,
        }
    }
}

fn validate(procedure: &Procedure) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSignature {
        name: procedure.name().to_string(),
        reason,
    };

    let name = procedure.name();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            "names may only contain ASCII letters, digits and underscores".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut defaults_started = false;
    for param in procedure.params() {
        if !seen.insert(param.name.as_str()) {
            return Err(invalid(format!("duplicate parameter '{}'", param.name)));
        }
        match (&param.default, defaults_started) {
            (Some(_), _) => defaults_started = true,
            (None, true) => {
                return Err(invalid(format!(
                    "required parameter '{}' follows a parameter with a default",
                    param.name
                )))
            }
            (None, false) => {}
        }
    }
    Ok(())
}
