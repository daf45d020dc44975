//! Run-time error model.
//!
//! Every failure a caller can observe while dispatching or running a unit of
//! work surfaces as a [`RunError`]. Collaborator crates keep their own error
//! types and convert into this one at the boundary.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type used across the dispatch layer.
pub type RunResult<T> = Result<T, RunError>;

#[derive(Debug, Error)]
pub enum RunError {
    /// A required argument was absent or null.
    #[error("argument \"{name}\" is required by {owner}")]
    MissingArgument { name: String, owner: String },

    /// A validator rejected the value (predicate, callable or type check).
    #[error("argument \"{name}\" is invalid: {message}")]
    InvalidArgument { name: String, message: String },

    /// A validating object rejected the value.
    #[error("validation failed for \"{name}\": {message}")]
    ValidationFailed { name: String, message: String },

    /// The rule engine rejected the value; messages are keyed by field.
    #[error("argument \"{name}\" failed rule validation")]
    RuleValidationFailed {
        name: String,
        messages: BTreeMap<String, Vec<String>>,
    },

    /// The validator itself is malformed.
    #[error("validator {validator} for \"{name}\" is not supported")]
    UnsupportedValidator { name: String, validator: String },

    #[error("{target} is not runnable")]
    NotRunnable { target: String },

    #[error("{type_name} is not a command")]
    NotACommand { type_name: String },

    #[error("{type_name} is not a query")]
    NotAQuery { type_name: String },

    /// A capability-gated operation was called on something lacking it.
    #[error("only call {method}() on {capability} instances")]
    NotSupported { method: String, capability: String },

    /// Dynamic call naming a method the target does not have.
    #[error("{type_name} has no method {method}()")]
    UnknownMethod { method: String, type_name: String },

    #[error("no tags defined for {type_name}")]
    MissingTags { type_name: String },

    /// A collaborator service was needed but never configured.
    #[error("no {service} service is configured")]
    MissingService { service: String },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("cache failure: {0}")]
    Cache(String),

    #[error("transaction failure: {0}")]
    Transaction(String),

    #[error("event dispatch failure: {0}")]
    Events(String),

    #[error("queue failure: {0}")]
    Queue(String),

    #[error("query failure: {0}")]
    Query(String),

    /// Raised by a runnable's own logic; passes through the decorators untouched.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl RunError {
    pub fn missing_argument(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::MissingArgument {
            name: name.into(),
            owner: owner.into(),
        }
    }

    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_supported(method: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::NotSupported {
            method: method.into(),
            capability: capability.into(),
        }
    }

    pub fn missing_service(service: impl Into<String>) -> Self {
        Self::MissingService {
            service: service.into(),
        }
    }

    /// Wrap an arbitrary failure from a runnable's own logic.
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!("{msg}"))
    }

    /// True for failures caused by the caller's input or by a capability
    /// mismatch. Retrying such work cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RunError::MissingArgument { .. }
                | RunError::InvalidArgument { .. }
                | RunError::ValidationFailed { .. }
                | RunError::RuleValidationFailed { .. }
                | RunError::UnsupportedValidator { .. }
                | RunError::NotRunnable { .. }
                | RunError::NotACommand { .. }
                | RunError::NotAQuery { .. }
                | RunError::NotSupported { .. }
                | RunError::UnknownMethod { .. }
                | RunError::MissingTags { .. }
        )
    }
}

impl From<serde_json::Error> for RunError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_keeps_the_original_message() {
        let err = RunError::failed("foo");
        assert_eq!(err.to_string(), "foo");
        assert!(!err.is_permanent());
    }

    #[test]
    fn missing_argument_names_argument_and_owner() {
        let err = RunError::missing_argument("email", "CreateUser");
        assert_eq!(err.to_string(), "argument \"email\" is required by CreateUser");
        assert!(err.is_permanent());
    }

    #[test]
    fn not_supported_names_method_and_capability() {
        let err = RunError::not_supported("paginate", "Query");
        assert_eq!(err.to_string(), "only call paginate() on Query instances");
    }
}
