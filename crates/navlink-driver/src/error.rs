//! Driver error types.

use std::path::PathBuf;
use std::time::Duration;

use navlink_protocol::ProtocolError;
use navlink_schema::SchemaError;
use navlink_transport::TransportError;
use thiserror::Error;

use crate::session::SessionState;

/// How a single request/response exchange failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// No matching reply arrived before the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The message center was stopped before the transaction resolved.
    #[error("message center stopped")]
    Disconnected,

    /// The device answered with a NAK for this command.
    #[error("device rejected {0}")]
    Nak(String),

    /// The link failed while the transaction was queued or in flight.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The command could not be framed for this link.
    #[error("cannot encode command: {0}")]
    Encode(#[from] ProtocolError),
}

/// Firmware upgrade failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    /// A worker gave up.
    #[error("{worker}: {message}")]
    Worker {
        /// Worker name.
        worker: String,
        /// What went wrong.
        message: String,
    },

    /// A worker's request to the device failed.
    #[error("{worker}: {source}")]
    Transaction {
        /// Worker name.
        worker: String,
        /// Underlying transaction failure.
        #[source]
        source: TransactionError,
    },

    /// The upgrade was cancelled.
    #[error("upgrade stopped")]
    Stopped,

    /// The firmware file is malformed.
    #[error("invalid firmware image: {0}")]
    Image(String),

    /// The device family has no upgrade path.
    #[error("firmware upgrade is not supported for {0}")]
    Unsupported(String),
}

impl UpgradeError {
    pub(crate) fn worker(worker: &str, message: impl Into<String>) -> Self {
        UpgradeError::Worker {
            worker: worker.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level driver error.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Physical channel failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire decoding or encoding failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Schema lookup or validation failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Request/response failure.
    #[error("transaction failed: {0}")]
    Transaction(#[from] TransactionError),

    /// Firmware upgrade failure.
    #[error("upgrade failed: {0}")]
    Upgrade(#[from] UpgradeError),

    /// The device answered, but not in a shape we understand.
    #[error("unexpected response to {command}: {detail}")]
    UnexpectedResponse {
        /// Command description.
        command: String,
        /// What was wrong with the reply.
        detail: String,
    },

    /// The device reported a non-zero status code.
    #[error("device returned error code {code} for {command}")]
    DeviceError {
        /// Command description.
        command: String,
        /// Status code.
        code: i32,
    },

    /// The operation is not allowed in the session's current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation attempted.
        operation: &'static str,
        /// Session state at the time.
        state: SessionState,
    },

    /// The device family does not implement this operation.
    #[error("{operation} is not supported by {device}")]
    Unsupported {
        /// Operation attempted.
        operation: &'static str,
        /// Dialect name.
        device: &'static str,
    },

    /// A command name is not in the schema's command table.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A command was given the wrong arguments.
    #[error("usage: {0}")]
    Usage(String),

    /// No port answered any identity request.
    #[error("no device found")]
    DeviceNotFound,

    /// Detection was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Persisted state could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File access failure.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl DriverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unexpected(command: impl Into<String>, detail: impl Into<String>) -> Self {
        DriverError::UnexpectedResponse {
            command: command.into(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
