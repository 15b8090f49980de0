//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Payload does not fit the framing's length field.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Trailing checksum does not match the computed one.
    #[error("checksum mismatch: expected 0x{expected:04X}, computed 0x{actual:04X}")]
    CrcMismatch {
        /// Checksum carried by the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// Byte slice width does not match the field type.
    #[error("cannot decode {field_type}: expected {expected} bytes, got {actual}")]
    FieldDecode {
        /// Field type name.
        field_type: String,
        /// Width the type needs.
        expected: usize,
        /// Width supplied.
        actual: usize,
    },

    /// Value cannot be represented by the field type.
    #[error("cannot encode '{value}' as {field_type}")]
    FieldEncode {
        /// Field type name.
        field_type: String,
        /// Rendered value.
        value: String,
    },

    /// Field type name not known to the codec.
    #[error("unknown field type: {0}")]
    UnknownFieldType(String),

    /// Invalid data in frame.
    #[error("invalid frame data: {0}")]
    InvalidData(String),

    /// Malformed NMEA sentence.
    #[error("invalid NMEA sentence: {0}")]
    InvalidSentence(String),

    /// UTF-8 decoding error.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Create a field decode error.
    pub fn field_decode(field_type: impl Into<String>, expected: usize, actual: usize) -> Self {
        ProtocolError::FieldDecode {
            field_type: field_type.into(),
            expected,
            actual,
        }
    }

    /// Create a field encode error.
    pub fn field_encode(field_type: impl Into<String>, value: impl ToString) -> Self {
        ProtocolError::FieldEncode {
            field_type: field_type.into(),
            value: value.to_string(),
        }
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::field_decode("uint32", 4, 3);
        assert!(err.to_string().contains("expected 4 bytes"));

        let err = ProtocolError::CrcMismatch {
            expected: 0xE5CC,
            actual: 0x1234,
        };
        assert!(err.to_string().contains("0xE5CC"));
    }
}
