//! # Binding Error Types
//!
//! Typed error handling for the elements binding layer.
//! All fallible binding operations return `Result<T, ElementsError>`.
//!
//! SDK-level `{error}` payloads resolved by asynchronous artifact operations
//! are *not* represented here: they pass through to the caller untouched as
//! part of the resolved payload.

use thiserror::Error;

/// Core error type for the binding layer
#[derive(Debug, Error)]
pub enum ElementsError {
    /// Provider misconfiguration (missing/duplicate credentials, SDK absent)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A component was constructed outside its required ancestor scope
    #[error("{component} must be created within a {required} scope")]
    Scope {
        component: &'static str,
        required: &'static str,
    },

    /// Malformed options argument passed to an artifact-creation wrapper
    #[error("invalid options passed to {call}: expected an object, got {got}")]
    InvalidOptions {
        call: &'static str,
        got: &'static str,
    },

    /// A capability discriminator was supplied but is not a string
    #[error("invalid `type` passed to {call}: expected a string")]
    InvalidTypeValue { call: &'static str },

    /// More than one mounted widget matches the requested capability
    #[error("ambiguous {capability} inference: {count} mounted widgets match type `{requested}`")]
    AmbiguousInference {
        capability: &'static str,
        requested: String,
        count: usize,
    },

    /// A widget is required for the operation and none qualifies
    #[error("no mounted widget can produce a {capability} of type `{requested}`")]
    NoInferrableTarget {
        capability: &'static str,
        requested: String,
    },

    /// Synchronous fault raised by the external SDK (e.g. unknown widget kind)
    #[error("sdk error: {0}")]
    Sdk(String),
}

impl ElementsError {
    /// Returns true if this error came from widget inference
    pub fn is_inference(&self) -> bool {
        matches!(
            self,
            ElementsError::AmbiguousInference { .. } | ElementsError::NoInferrableTarget { .. }
        )
    }

    /// Returns true if this error is caused by malformed or unresolvable
    /// caller input rather than by the binding layer's own configuration
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ElementsError::InvalidOptions { .. }
                | ElementsError::InvalidTypeValue { .. }
                | ElementsError::AmbiguousInference { .. }
                | ElementsError::NoInferrableTarget { .. }
        )
    }
}

/// Result type alias for binding operations
pub type ElementsResult<T> = Result<T, ElementsError>;
