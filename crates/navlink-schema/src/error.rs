//! Schema error types.

use std::path::PathBuf;

use navlink_protocol::ProtocolError;
use thiserror::Error;

/// Errors from loading a schema or resolving names against it.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A parameter or packet is not part of the loaded schema.
    #[error("{kind} '{name}' is not in the loaded schema")]
    SchemaMismatch {
        /// What was looked up ("parameter", "output packet", ...).
        kind: &'static str,
        /// The name or id requested.
        name: String,
    },

    /// The document parsed but is inconsistent.
    #[error("invalid schema {context}: {message}")]
    Invalid {
        /// Where in the document.
        context: String,
        /// What is wrong.
        message: String,
    },

    /// A value violates the parameter's options or range.
    #[error("value {value} not allowed for '{parameter}': {reason}")]
    ValueRejected {
        /// Parameter name.
        parameter: String,
        /// Rendered value.
        value: String,
        /// Constraint description.
        reason: String,
    },

    /// No built-in schema with this name.
    #[error("no built-in schema named '{0}'")]
    UnknownBuiltin(String),

    /// JSON syntax or shape error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// Field encode/decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SchemaError {
    /// Shorthand for a mismatch.
    pub fn mismatch(kind: &'static str, name: impl ToString) -> Self {
        SchemaError::SchemaMismatch {
            kind,
            name: name.to_string(),
        }
    }

    /// Shorthand for an inconsistent document.
    pub fn invalid(context: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaError::Invalid {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
