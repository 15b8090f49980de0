//! Typed scalar fields used by parameter tables and packet layouts.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

// ============================================================================
// Field types
// ============================================================================

/// Semantic type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Fixed width text, NUL padded.
    Char(usize),
    /// Variable length bytes; takes whatever the slice holds.
    Str,
    Ip4,
    Ip6,
    /// Packed sign + axis permutation, 16 bits.
    Orientation,
    /// Low-pass filter cutoff encoded as a 16-bit count.
    Lpf,
}

impl FieldType {
    /// Parse a schema type name (`uint16`, `float`, `char8`, `ip4`, ...).
    pub fn parse(name: &str) -> Result<Self, ProtocolError> {
        let name = name.trim().to_ascii_lowercase();
        let ty = match name.as_str() {
            "uint8" => FieldType::U8,
            "uint16" => FieldType::U16,
            "uint32" => FieldType::U32,
            "uint64" => FieldType::U64,
            "int8" => FieldType::I8,
            "int16" => FieldType::I16,
            "int32" => FieldType::I32,
            "int64" => FieldType::I64,
            "float" | "float32" => FieldType::F32,
            "double" | "float64" => FieldType::F64,
            "string" => FieldType::Str,
            "ip4" => FieldType::Ip4,
            "ip6" => FieldType::Ip6,
            "orientation" => FieldType::Orientation,
            "lpf" => FieldType::Lpf,
            "char" => FieldType::Char(1),
            other => match other.strip_prefix("char").map(str::parse::<usize>) {
                Some(Ok(n)) if n > 0 => FieldType::Char(n),
                _ => return Err(ProtocolError::UnknownFieldType(name)),
            },
        };
        Ok(ty)
    }

    /// Encoded width in bytes; `None` for variable length strings.
    pub fn width(&self) -> Option<usize> {
        Some(match self {
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 | FieldType::Orientation | FieldType::Lpf => 2,
            FieldType::U32 | FieldType::I32 | FieldType::F32 | FieldType::Ip4 => 4,
            FieldType::U64 | FieldType::I64 | FieldType::F64 => 8,
            FieldType::Ip6 => 16,
            FieldType::Char(n) => *n,
            FieldType::Str => return None,
        })
    }

    /// Schema spelling.
    pub fn name(&self) -> String {
        match self {
            FieldType::U8 => "uint8".into(),
            FieldType::U16 => "uint16".into(),
            FieldType::U32 => "uint32".into(),
            FieldType::U64 => "uint64".into(),
            FieldType::I8 => "int8".into(),
            FieldType::I16 => "int16".into(),
            FieldType::I32 => "int32".into(),
            FieldType::I64 => "int64".into(),
            FieldType::F32 => "float".into(),
            FieldType::F64 => "double".into(),
            FieldType::Char(n) => format!("char{n}"),
            FieldType::Str => "string".into(),
            FieldType::Ip4 => "ip4".into(),
            FieldType::Ip6 => "ip6".into(),
            FieldType::Orientation => "orientation".into(),
            FieldType::Lpf => "lpf".into(),
        }
    }

    /// Parse user text (CLI or config) into a value of this type.
    pub fn parse_value(&self, text: &str) -> Result<FieldValue, ProtocolError> {
        let text = text.trim();
        let bad = || ProtocolError::field_encode(self.name(), text);
        let value = match self {
            FieldType::U8 | FieldType::U16 | FieldType::U32 | FieldType::U64 => {
                FieldValue::UInt(text.parse().map_err(|_| bad())?)
            }
            FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64 => {
                FieldValue::Int(text.parse().map_err(|_| bad())?)
            }
            FieldType::F32 | FieldType::F64 | FieldType::Lpf => {
                FieldValue::Float(text.parse().map_err(|_| bad())?)
            }
            FieldType::Char(_) | FieldType::Str => FieldValue::Text(text.to_string()),
            FieldType::Ip4 | FieldType::Ip6 => FieldValue::Ip(text.parse().map_err(|_| bad())?),
            FieldType::Orientation => FieldValue::Orientation(text.parse()?),
        };
        Ok(value)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// ============================================================================
// Values
// ============================================================================

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    UInt(u64),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Ip(IpAddr),
    Orientation(Orientation),
}

impl FieldValue {
    /// Numeric view, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::UInt(v) => Some(*v as f64),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as shown to callers and sinks: NaN floats become 0.
    ///
    /// Decoders keep the raw NaN so diagnostics can still see it.
    pub fn surfaced(&self) -> FieldValue {
        match self {
            FieldValue::Float(v) if v.is_nan() => FieldValue::Float(0.0),
            other => other.clone(),
        }
    }

    fn to_u64(&self, ty: FieldType) -> Result<u64, ProtocolError> {
        match self {
            FieldValue::UInt(v) => Ok(*v),
            FieldValue::Int(v) if *v >= 0 => Ok(*v as u64),
            FieldValue::Float(v) if v.is_finite() && v.fract() == 0.0 && *v >= 0.0 => Ok(*v as u64),
            _ => Err(ProtocolError::field_encode(ty.name(), self)),
        }
    }

    fn to_i64(&self, ty: FieldType) -> Result<i64, ProtocolError> {
        match self {
            FieldValue::Int(v) => Ok(*v),
            FieldValue::UInt(v) => i64::try_from(*v).map_err(|_| ProtocolError::field_encode(ty.name(), self)),
            FieldValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Ok(*v as i64),
            _ => Err(ProtocolError::field_encode(ty.name(), self)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            FieldValue::Ip(ip) => write!(f, "{ip}"),
            FieldValue::Orientation(o) => write!(f, "{o}"),
        }
    }
}

// ============================================================================
// Orientation
// ============================================================================

/// A body axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

/// One user axis mapped onto a signed body axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignedAxis {
    pub negative: bool,
    pub axis: Axis,
}

/// Mounting orientation: which signed body axis each user axis follows.
///
/// Packed per user axis `i` at bit `3*i`: one sign bit, then a two-bit code
/// counting forward from the user axis itself (`X→X,Y,Z`, `Y→Y,Z,X`,
/// `Z→Z,X,Y`). Zero is the identity mounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Orientation {
    pub axes: [SignedAxis; 3],
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation {
            axes: Axis::ALL.map(|axis| SignedAxis {
                negative: false,
                axis,
            }),
        }
    }
}

impl Orientation {
    fn validate(self) -> Result<Self, ProtocolError> {
        let mut seen = [false; 3];
        for a in &self.axes {
            seen[a.axis.index()] = true;
        }
        if seen.iter().all(|s| *s) {
            Ok(self)
        } else {
            Err(ProtocolError::InvalidData(format!(
                "orientation {self} is not an axis permutation"
            )))
        }
    }

    /// Pack into the device bitfield.
    pub fn to_bits(&self) -> u16 {
        self.axes.iter().enumerate().fold(0u16, |bits, (slot, a)| {
            let code = ((a.axis.index() + 3 - slot) % 3) as u16;
            bits | ((a.negative as u16) | (code << 1)) << (3 * slot)
        })
    }

    /// Unpack the device bitfield.
    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        let mut axes = Orientation::default().axes;
        for (slot, entry) in axes.iter_mut().enumerate() {
            let group = (bits >> (3 * slot)) & 0b111;
            let code = (group >> 1) as usize;
            if code > 2 {
                return Err(ProtocolError::InvalidData(format!(
                    "bad orientation code 0x{bits:04x}"
                )));
            }
            *entry = SignedAxis {
                negative: group & 1 == 1,
                axis: Axis::ALL[(slot + code) % 3],
            };
        }
        Orientation { axes }.validate()
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in &self.axes {
            write!(f, "{}{}", if a.negative { '-' } else { '+' }, a.axis.letter())?;
        }
        Ok(())
    }
}

impl FromStr for Orientation {
    type Err = ProtocolError;

    /// Parse `+X+Y+Z` style text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ProtocolError::InvalidData(format!("bad orientation '{s}'"));
        let chars: Vec<char> = s.trim().to_ascii_uppercase().chars().collect();
        if chars.len() != 6 {
            return Err(bad());
        }
        let mut axes = Orientation::default().axes;
        for (entry, pair) in axes.iter_mut().zip(chars.chunks(2)) {
            let negative = match pair[0] {
                '+' => false,
                '-' => true,
                _ => return Err(bad()),
            };
            let axis = match pair[1] {
                'X' => Axis::X,
                'Y' => Axis::Y,
                'Z' => Axis::Z,
                _ => return Err(bad()),
            };
            *entry = SignedAxis { negative, axis };
        }
        Orientation { axes }.validate()
    }
}

// ============================================================================
// Low-pass filter tables
// ============================================================================

/// Encode breakpoints: cutoffs below `upper` Hz map to `count`.
/// Anything at or above the last breakpoint encodes as [`LPF_ENCODE_TOP`].
const LPF_ENCODE_TABLE: [(f64, u16); 6] = [
    (3.5, 100),
    (7.5, 40),
    (15.0, 20),
    (22.5, 10),
    (32.5, 8),
    (45.0, 5),
];
const LPF_ENCODE_TOP: u16 = 4;

/// Decode ranges: counts at or above `min` read back as `hz`, checked top down.
/// These do not invert the encode table exactly at every boundary.
const LPF_DECODE_TABLE: [(u16, f64); 7] = [
    (70, 2.0),
    (30, 5.0),
    (15, 10.0),
    (9, 20.0),
    (7, 25.0),
    (5, 40.0),
    (1, 50.0),
];

/// Cutoff frequency in Hz to filter count. Non-positive means unfiltered (0).
pub fn lpf_encode(hz: f64) -> u16 {
    if hz.is_nan() || hz <= 0.0 {
        return 0;
    }
    LPF_ENCODE_TABLE
        .iter()
        .find(|(upper, _)| hz < *upper)
        .map(|(_, count)| *count)
        .unwrap_or(LPF_ENCODE_TOP)
}

/// Filter count to the supported cutoff in Hz. Zero means unfiltered.
pub fn lpf_decode(count: u16) -> f64 {
    LPF_DECODE_TABLE
        .iter()
        .find(|(min, _)| count >= *min)
        .map(|(_, hz)| *hz)
        .unwrap_or(0.0)
}

// ============================================================================
// Codec
// ============================================================================

/// Byte order of multi-byte numeric fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endian {
    /// OpenIMU / OpenRTK / INS401.
    #[default]
    Little,
    /// DMU.
    Big,
}

/// Converts between field values and bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldCodec {
    pub endian: Endian,
}

macro_rules! get_num {
    ($buf:expr, $endian:expr, $le:ident, $be:ident) => {
        match $endian {
            Endian::Little => $buf.$le(),
            Endian::Big => $buf.$be(),
        }
    };
}

macro_rules! put_num {
    ($buf:expr, $endian:expr, $le:ident, $be:ident, $value:expr) => {
        match $endian {
            Endian::Little => $buf.$le($value),
            Endian::Big => $buf.$be($value),
        }
    };
}

impl FieldCodec {
    /// Codec with the given byte order.
    pub fn new(endian: Endian) -> Self {
        FieldCodec { endian }
    }

    /// Decode one field. Fails when `bytes` is not exactly the type's width.
    pub fn decode(&self, ty: FieldType, bytes: &[u8]) -> Result<FieldValue, ProtocolError> {
        if let Some(width) = ty.width() {
            if bytes.len() != width {
                return Err(ProtocolError::field_decode(ty.name(), width, bytes.len()));
            }
        }
        let mut buf = bytes;
        let e = self.endian;
        let value = match ty {
            FieldType::U8 => FieldValue::UInt(buf.get_u8() as u64),
            FieldType::U16 => FieldValue::UInt(get_num!(buf, e, get_u16_le, get_u16) as u64),
            FieldType::U32 => FieldValue::UInt(get_num!(buf, e, get_u32_le, get_u32) as u64),
            FieldType::U64 => FieldValue::UInt(get_num!(buf, e, get_u64_le, get_u64)),
            FieldType::I8 => FieldValue::Int(buf.get_i8() as i64),
            FieldType::I16 => FieldValue::Int(get_num!(buf, e, get_i16_le, get_i16) as i64),
            FieldType::I32 => FieldValue::Int(get_num!(buf, e, get_i32_le, get_i32) as i64),
            FieldType::I64 => FieldValue::Int(get_num!(buf, e, get_i64_le, get_i64)),
            FieldType::F32 => FieldValue::Float(get_num!(buf, e, get_f32_le, get_f32) as f64),
            FieldType::F64 => FieldValue::Float(get_num!(buf, e, get_f64_le, get_f64)),
            FieldType::Char(_) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let text = std::str::from_utf8(&bytes[..end]).map_err(|_| ProtocolError::InvalidUtf8)?;
                FieldValue::Text(text.trim().to_string())
            }
            FieldType::Str => match std::str::from_utf8(bytes) {
                Ok(text) => FieldValue::Text(text.to_string()),
                Err(_) => FieldValue::Bytes(bytes.to_vec()),
            },
            FieldType::Ip4 => FieldValue::Ip(IpAddr::V4(Ipv4Addr::new(
                bytes[0], bytes[1], bytes[2], bytes[3],
            ))),
            FieldType::Ip6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                FieldValue::Ip(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            FieldType::Orientation => FieldValue::Orientation(Orientation::from_bits(get_num!(
                buf, e, get_u16_le, get_u16
            ))?),
            FieldType::Lpf => FieldValue::Float(lpf_decode(get_num!(buf, e, get_u16_le, get_u16))),
        };
        Ok(value)
    }

    /// Encode one field, checking the value fits the type.
    pub fn encode(&self, ty: FieldType, value: &FieldValue) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(ty.width().unwrap_or(16));
        self.encode_into(ty, value, &mut buf)?;
        Ok(buf)
    }

    /// Encode one field onto the end of `buf`.
    pub fn encode_into(
        &self,
        ty: FieldType,
        value: &FieldValue,
        buf: &mut Vec<u8>,
    ) -> Result<(), ProtocolError> {
        let e = self.endian;
        let out_of_range = || ProtocolError::field_encode(ty.name(), value);
        match ty {
            FieldType::U8 => buf.put_u8(u8::try_from(value.to_u64(ty)?).map_err(|_| out_of_range())?),
            FieldType::U16 => {
                let v = u16::try_from(value.to_u64(ty)?).map_err(|_| out_of_range())?;
                put_num!(buf, e, put_u16_le, put_u16, v)
            }
            FieldType::U32 => {
                let v = u32::try_from(value.to_u64(ty)?).map_err(|_| out_of_range())?;
                put_num!(buf, e, put_u32_le, put_u32, v)
            }
            FieldType::U64 => put_num!(buf, e, put_u64_le, put_u64, value.to_u64(ty)?),
            FieldType::I8 => buf.put_i8(i8::try_from(value.to_i64(ty)?).map_err(|_| out_of_range())?),
            FieldType::I16 => {
                let v = i16::try_from(value.to_i64(ty)?).map_err(|_| out_of_range())?;
                put_num!(buf, e, put_i16_le, put_i16, v)
            }
            FieldType::I32 => {
                let v = i32::try_from(value.to_i64(ty)?).map_err(|_| out_of_range())?;
                put_num!(buf, e, put_i32_le, put_i32, v)
            }
            FieldType::I64 => put_num!(buf, e, put_i64_le, put_i64, value.to_i64(ty)?),
            FieldType::F32 => {
                let v = value.as_f64().ok_or_else(out_of_range)? as f32;
                put_num!(buf, e, put_f32_le, put_f32, v)
            }
            FieldType::F64 => {
                let v = value.as_f64().ok_or_else(out_of_range)?;
                put_num!(buf, e, put_f64_le, put_f64, v)
            }
            FieldType::Char(n) => {
                let text = value.as_str().ok_or_else(out_of_range)?;
                if text.len() > n {
                    return Err(out_of_range());
                }
                buf.put_slice(text.as_bytes());
                buf.put_bytes(0, n - text.len());
            }
            FieldType::Str => match value {
                FieldValue::Text(s) => buf.put_slice(s.as_bytes()),
                FieldValue::Bytes(b) => buf.put_slice(b),
                _ => return Err(out_of_range()),
            },
            FieldType::Ip4 => match value {
                FieldValue::Ip(IpAddr::V4(ip)) => buf.put_slice(&ip.octets()),
                FieldValue::Text(s) => {
                    let ip: Ipv4Addr = s.parse().map_err(|_| out_of_range())?;
                    buf.put_slice(&ip.octets())
                }
                _ => return Err(out_of_range()),
            },
            FieldType::Ip6 => match value {
                FieldValue::Ip(IpAddr::V6(ip)) => buf.put_slice(&ip.octets()),
                FieldValue::Text(s) => {
                    let ip: Ipv6Addr = s.parse().map_err(|_| out_of_range())?;
                    buf.put_slice(&ip.octets())
                }
                _ => return Err(out_of_range()),
            },
            FieldType::Orientation => {
                let orientation = match value {
                    FieldValue::Orientation(o) => *o,
                    FieldValue::Text(s) => s.parse()?,
                    FieldValue::UInt(bits) => {
                        Orientation::from_bits(u16::try_from(*bits).map_err(|_| out_of_range())?)?
                    }
                    _ => return Err(out_of_range()),
                };
                put_num!(buf, e, put_u16_le, put_u16, orientation.to_bits())
            }
            FieldType::Lpf => {
                let hz = value.as_f64().ok_or_else(out_of_range)?;
                put_num!(buf, e, put_u16_le, put_u16, lpf_encode(hz))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(codec: FieldCodec, ty: FieldType, value: FieldValue) {
        let bytes = codec.encode(ty, &value).unwrap();
        assert_eq!(Some(bytes.len()).filter(|_| ty != FieldType::Str), ty.width());
        let back = codec.decode(ty, &bytes).unwrap();
        assert_eq!(back, value, "{ty} round trip");
    }

    #[test]
    fn test_parse_type_names() {
        assert_eq!(FieldType::parse("uint32").unwrap(), FieldType::U32);
        assert_eq!(FieldType::parse("float").unwrap(), FieldType::F32);
        assert_eq!(FieldType::parse("char8").unwrap(), FieldType::Char(8));
        assert_eq!(FieldType::parse("IP4").unwrap(), FieldType::Ip4);
        assert!(matches!(
            FieldType::parse("quaternion"),
            Err(ProtocolError::UnknownFieldType(_))
        ));
        assert!(FieldType::parse("char0").is_err());
    }

    #[test]
    fn test_integer_boundaries() {
        for codec in [FieldCodec::new(Endian::Little), FieldCodec::new(Endian::Big)] {
            round_trip(codec, FieldType::U8, FieldValue::UInt(u8::MAX as u64));
            round_trip(codec, FieldType::U16, FieldValue::UInt(0));
            round_trip(codec, FieldType::U32, FieldValue::UInt(u32::MAX as u64));
            round_trip(codec, FieldType::U64, FieldValue::UInt(u64::MAX));
            round_trip(codec, FieldType::I8, FieldValue::Int(i8::MIN as i64));
            round_trip(codec, FieldType::I16, FieldValue::Int(-1));
            round_trip(codec, FieldType::I32, FieldValue::Int(i32::MAX as i64));
            round_trip(codec, FieldType::I64, FieldValue::Int(i64::MIN));
        }
    }

    #[test]
    fn test_endianness_on_the_wire() {
        let value = FieldValue::UInt(0x0102);
        assert_eq!(FieldCodec::new(Endian::Little).encode(FieldType::U16, &value).unwrap(), [0x02, 0x01]);
        assert_eq!(FieldCodec::new(Endian::Big).encode(FieldType::U16, &value).unwrap(), [0x01, 0x02]);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let codec = FieldCodec::default();
        assert!(codec.encode(FieldType::U8, &FieldValue::UInt(256)).is_err());
        assert!(codec.encode(FieldType::U16, &FieldValue::Int(-1)).is_err());
        assert!(codec.encode(FieldType::I8, &FieldValue::Int(128)).is_err());
        assert!(codec.encode(FieldType::U32, &FieldValue::Float(1.5)).is_err());
        assert!(codec.encode(FieldType::U32, &FieldValue::Text("1".into())).is_err());
    }

    #[test]
    fn test_floats_and_nan_surfacing() {
        let codec = FieldCodec::default();
        round_trip(codec, FieldType::F32, FieldValue::Float(-0.5));
        round_trip(codec, FieldType::F64, FieldValue::Float(f64::MAX));

        let bytes = codec.encode(FieldType::F32, &FieldValue::Float(f64::NAN)).unwrap();
        let raw = codec.decode(FieldType::F32, &bytes).unwrap();
        assert!(raw.as_f64().unwrap().is_nan());
        assert_eq!(raw.surfaced(), FieldValue::Float(0.0));
    }

    #[test]
    fn test_width_mismatch_fails_cleanly() {
        let codec = FieldCodec::default();
        assert_eq!(
            codec.decode(FieldType::U32, &[1, 2, 3]),
            Err(ProtocolError::field_decode("uint32", 4, 3))
        );
        assert!(codec.decode(FieldType::Char(4), &[b'a']).is_err());
    }

    #[test]
    fn test_char_padding_and_trimming() {
        let codec = FieldCodec::default();
        let bytes = codec.encode(FieldType::Char(8), &FieldValue::Text("s1".into())).unwrap();
        assert_eq!(bytes, b"s1\0\0\0\0\0\0");
        assert_eq!(codec.decode(FieldType::Char(8), &bytes).unwrap(), FieldValue::Text("s1".into()));
        assert!(codec.encode(FieldType::Char(2), &FieldValue::Text("abc".into())).is_err());
        round_trip(codec, FieldType::Str, FieldValue::Text("free form".into()));
    }

    #[test]
    fn test_ip_fields() {
        let codec = FieldCodec::default();
        let ip4 = FieldType::Ip4.parse_value("192.168.1.10").unwrap();
        assert_eq!(codec.encode(FieldType::Ip4, &ip4).unwrap(), [192, 168, 1, 10]);
        round_trip(codec, FieldType::Ip4, ip4);
        round_trip(codec, FieldType::Ip6, FieldType::Ip6.parse_value("fe80::1").unwrap());
    }

    #[test]
    fn test_orientation_bits() {
        assert_eq!(Orientation::default().to_bits(), 0);
        let o: Orientation = "-Y+X+Z".parse().unwrap();
        assert_eq!(o.to_bits(), 0x23);
        assert_eq!(Orientation::from_bits(0x23).unwrap(), o);
        assert_eq!(o.to_string(), "-Y+X+Z");
        assert!("+X+X+Z".parse::<Orientation>().is_err());
        // Code 3 is unused.
        assert!(Orientation::from_bits(0b110).is_err());
        round_trip(FieldCodec::default(), FieldType::Orientation, FieldValue::Orientation(o));
    }

    #[test]
    fn test_lpf_tables() {
        assert_eq!(lpf_encode(0.0), 0);
        assert_eq!(lpf_encode(2.0), 100);
        assert_eq!(lpf_encode(3.5), 40);
        assert_eq!(lpf_encode(25.0), 8);
        assert_eq!(lpf_encode(50.0), 4);
        assert_eq!(lpf_decode(0), 0.0);
        assert_eq!(lpf_decode(4), 50.0);
        assert_eq!(lpf_decode(6), 40.0);
        assert_eq!(lpf_decode(14), 20.0);
        assert_eq!(lpf_decode(69), 5.0);
        assert_eq!(lpf_decode(u16::MAX), 2.0);
        // Supported cutoffs survive a trip through the device.
        for hz in [0.0, 2.0, 5.0, 10.0, 20.0, 25.0, 40.0, 50.0] {
            assert_eq!(lpf_decode(lpf_encode(hz)), hz);
            round_trip(FieldCodec::default(), FieldType::Lpf, FieldValue::Float(hz));
        }
    }
}
