//! Transport error types.

use thiserror::Error;

/// Errors raised by a physical channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The port could not be opened.
    #[error("failed to open {port}: {source}")]
    Open {
        /// Port or endpoint name.
        port: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Serial driver failure after the port was opened.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Socket or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// The operation makes no sense for this kind of channel.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),

    /// A received frame does not fit the caller's buffer.
    #[error("frame of {size} bytes does not fit a {capacity} byte buffer")]
    FrameTooLarge {
        /// Frame size.
        size: usize,
        /// Buffer size.
        capacity: usize,
    },

    /// Failure injected by a test double.
    #[error("{0}")]
    Injected(String),
}

impl TransportError {
    /// Wrap an open failure with the port name.
    pub fn open(port: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        TransportError::Open {
            port: port.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
