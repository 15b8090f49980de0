//! JSON-facing parameter values.
//!
//! [`ParamValue`] is what schema documents, configuration files and CLI
//! output carry. It converts to and from the wire-level
//! [`FieldValue`] once the parameter's [`FieldType`] is known.

use std::fmt;
use std::net::IpAddr;

use navlink_protocol::{FieldType, FieldValue};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

// ============================================================================
// Param Value Enum
// ============================================================================

/// A loosely typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Signed integer.
    Integer(i64),
    /// Unsigned integer too large for `Integer`.
    Unsigned(u64),
    /// Floating point.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Text (also used for addresses and orientations).
    String(String),
}

impl ParamValue {
    /// Numeric view, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(v) => Some(*v as f64),
            ParamValue::Unsigned(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            ParamValue::String(_) => None,
        }
    }

    /// Convert to i64 if the value is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(v) => Some(*v),
            ParamValue::Unsigned(v) => i64::try_from(*v).ok(),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            ParamValue::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Convert to u64 if the value is integral and non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Integer(v) if *v >= 0 => Some(*v as u64),
            ParamValue::Unsigned(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as u64),
            ParamValue::Bool(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Text view, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether two values denote the same setting (numbers compare by value).
    pub fn same_as(&self, other: &ParamValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self.as_str(), other.as_str()) {
                (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
                _ => false,
            },
        }
    }

    /// Interpret as a wire value of type `ty`.
    pub fn to_field(&self, ty: FieldType) -> Result<FieldValue> {
        let mismatch = || {
            SchemaError::Protocol(navlink_protocol::ProtocolError::field_encode(ty.name(), self))
        };
        let value = match ty {
            FieldType::U8 | FieldType::U16 | FieldType::U32 | FieldType::U64 => {
                FieldValue::UInt(self.as_u64().ok_or_else(mismatch)?)
            }
            FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64 => {
                FieldValue::Int(self.as_i64().ok_or_else(mismatch)?)
            }
            FieldType::F32 | FieldType::F64 | FieldType::Lpf => {
                FieldValue::Float(self.as_f64().ok_or_else(mismatch)?)
            }
            FieldType::Char(_) | FieldType::Str => {
                FieldValue::Text(self.as_str().ok_or_else(mismatch)?.to_string())
            }
            FieldType::Ip4 | FieldType::Ip6 | FieldType::Orientation => {
                ty.parse_value(self.as_str().ok_or_else(mismatch)?)?
            }
        };
        Ok(value)
    }

    /// JSON-facing form of a decoded wire value. NaN surfaces as 0.
    pub fn from_field(value: &FieldValue) -> Self {
        match value.surfaced() {
            FieldValue::UInt(v) => match i64::try_from(v) {
                Ok(i) => ParamValue::Integer(i),
                Err(_) => ParamValue::Unsigned(v),
            },
            FieldValue::Int(v) => ParamValue::Integer(v),
            FieldValue::Float(v) => ParamValue::Float(v),
            FieldValue::Text(s) => ParamValue::String(s),
            FieldValue::Ip(ip) => ParamValue::String(ip.to_string()),
            other @ (FieldValue::Bytes(_) | FieldValue::Orientation(_)) => {
                ParamValue::String(other.to_string())
            }
        }
    }

    /// Parse CLI text: numbers become numbers, anything else stays text.
    pub fn parse_loose(text: &str) -> Self {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            return ParamValue::Integer(v);
        }
        if let Ok(v) = text.parse::<u64>() {
            return ParamValue::Unsigned(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            return ParamValue::Float(v);
        }
        match text {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            _ => ParamValue::String(text.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Unsigned(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// From implementations for ParamValue
// ============================================================================

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Integer(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl From<IpAddr> for ParamValue {
    fn from(v: IpAddr) -> Self {
        ParamValue::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_forms() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[200, -3, 18446744073709551615, 0.5, "z1", true]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Integer(200),
                ParamValue::Integer(-3),
                ParamValue::Unsigned(u64::MAX),
                ParamValue::Float(0.5),
                ParamValue::String("z1".into()),
                ParamValue::Bool(true),
            ]
        );
    }

    #[test]
    fn test_same_as_compares_numbers_by_value() {
        assert!(ParamValue::Integer(50).same_as(&ParamValue::Float(50.0)));
        assert!(ParamValue::from("Z1").same_as(&ParamValue::from("z1")));
        assert!(!ParamValue::Integer(1).same_as(&ParamValue::from("1")));
    }

    #[test]
    fn test_field_conversions() {
        assert_eq!(ParamValue::Integer(7).to_field(FieldType::U16).unwrap(), FieldValue::UInt(7));
        assert!(ParamValue::Integer(-7).to_field(FieldType::U16).is_err());
        assert_eq!(
            ParamValue::from("10.0.0.2").to_field(FieldType::Ip4).unwrap(),
            FieldValue::Ip("10.0.0.2".parse().unwrap())
        );
        assert_eq!(ParamValue::from_field(&FieldValue::Float(f64::NAN)), ParamValue::Float(0.0));
        assert_eq!(ParamValue::from_field(&FieldValue::UInt(u64::MAX)), ParamValue::Unsigned(u64::MAX));
    }

    #[test]
    fn test_parse_loose() {
        assert_eq!(ParamValue::parse_loose("100"), ParamValue::Integer(100));
        assert_eq!(ParamValue::parse_loose(" 2.5 "), ParamValue::Float(2.5));
        assert_eq!(ParamValue::parse_loose("+X+Y+Z"), ParamValue::String("+X+Y+Z".into()));
    }
}
