//! Parameter table: ids, types, access, and value constraints.

use std::collections::HashMap;
use std::fmt;

use navlink_protocol::{FieldCodec, FieldType, FieldValue, ProtocolError};

use crate::document::RawParameter;
use crate::error::{Result, SchemaError};
use crate::value::ParamValue;

/// Every parameter occupies a fixed 8-byte slot on the wire.
pub const PARAM_SLOT_SIZE: usize = 8;

/// Category used when the document leaves it out.
pub const DEFAULT_CATEGORY: &str = "General";

/// Who may change a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    /// Listed for completeness (CRC, table size); never read or written.
    Disabled,
}

/// Allowed values.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    None,
    Options(Vec<ParamValue>),
    Range { min: f64, max: f64 },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::None => f.write_str("any"),
            Constraint::Options(options) => {
                let list: Vec<String> = options.iter().map(ToString::to_string).collect();
                write!(f, "one of [{}]", list.join(", "))
            }
            Constraint::Range { min, max } => write!(f, "between {min} and {max}"),
        }
    }
}

/// One validated parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub id: u32,
    pub name: String,
    pub argument: Option<String>,
    pub field_type: FieldType,
    pub category: String,
    pub access: Access,
    pub constraint: Constraint,
}

impl ParameterDef {
    pub(crate) fn from_raw(raw: &RawParameter) -> Result<Self> {
        let context = || format!("parameter {} ('{}')", raw.param_id, raw.name);
        let field_type = FieldType::parse(&raw.field_type)
            .map_err(|e| SchemaError::invalid(context(), e.to_string()))?;
        if field_type.width().is_some_and(|w| w > PARAM_SLOT_SIZE) {
            return Err(SchemaError::invalid(
                context(),
                format!("{field_type} does not fit an {PARAM_SLOT_SIZE}-byte slot"),
            ));
        }

        let access = match raw.param_type.as_deref() {
            Some("disabled") => Access::Disabled,
            Some("read_only") | Some("readonly") => Access::ReadOnly,
            None | Some("") | Some("read_write") => Access::ReadWrite,
            Some(other) => {
                return Err(SchemaError::invalid(context(), format!("unknown paramType '{other}'")))
            }
        };

        let constraint = match (&raw.options, raw.range) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::invalid(context(), "both options and range given"))
            }
            (Some(options), None) => Constraint::Options(options.clone()),
            (None, Some(range)) if range.min > range.max => {
                return Err(SchemaError::invalid(context(), "range min exceeds max"))
            }
            (None, Some(range)) => Constraint::Range {
                min: range.min,
                max: range.max,
            },
            (None, None) => Constraint::None,
        };

        Ok(ParameterDef {
            id: raw.param_id,
            name: raw.name.clone(),
            argument: raw.argument.clone(),
            field_type,
            category: raw
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            access,
            constraint,
        })
    }

    /// Whether `name` refers to this parameter (display name or argument, any case).
    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name)
            || self
                .argument
                .as_deref()
                .is_some_and(|arg| arg.eq_ignore_ascii_case(name))
    }

    /// Whether the parameter can be read from the device.
    pub fn is_readable(&self) -> bool {
        self.access != Access::Disabled
    }

    /// Check a requested value and convert it to its wire form.
    pub fn validate(&self, value: &ParamValue) -> Result<FieldValue> {
        let rejected = |reason: String| SchemaError::ValueRejected {
            parameter: self.name.clone(),
            value: value.to_string(),
            reason,
        };
        if self.access != Access::ReadWrite {
            return Err(rejected("parameter is not writable".into()));
        }
        let field = value.to_field(self.field_type)?;
        match &self.constraint {
            Constraint::None => {}
            Constraint::Options(options) => {
                if !options.iter().any(|o| o.same_as(value)) {
                    return Err(rejected(format!("must be {}", self.constraint)));
                }
            }
            Constraint::Range { min, max } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| rejected("expected a number".into()))?;
                if v < *min || v > *max {
                    return Err(rejected(format!("must be {}", self.constraint)));
                }
            }
        }
        Ok(field)
    }

    /// Decode the value held in a wire slot. Narrow types use the leading bytes.
    pub fn decode_slot(&self, codec: &FieldCodec, slot: &[u8]) -> Result<FieldValue> {
        let bytes = match self.field_type.width() {
            Some(width) => slot.get(..width).ok_or_else(|| {
                ProtocolError::field_decode(self.field_type.name(), width, slot.len())
            })?,
            None => {
                let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
                &slot[..end]
            }
        };
        Ok(codec.decode(self.field_type, bytes)?)
    }

    /// Encode a value into a zero-padded wire slot.
    pub fn encode_slot(&self, codec: &FieldCodec, value: &FieldValue) -> Result<[u8; PARAM_SLOT_SIZE]> {
        let bytes = codec.encode(self.field_type, value)?;
        if bytes.len() > PARAM_SLOT_SIZE {
            return Err(ProtocolError::field_encode(self.field_type.name(), value).into());
        }
        let mut slot = [0u8; PARAM_SLOT_SIZE];
        slot[..bytes.len()].copy_from_slice(&bytes);
        Ok(slot)
    }
}

/// Ordered parameter table with id lookup.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    params: Vec<ParameterDef>,
    by_id: HashMap<u32, usize>,
}

impl ParameterTable {
    pub(crate) fn from_raw(raw: &[RawParameter]) -> Result<Self> {
        let mut table = ParameterTable::default();
        for entry in raw {
            let def = ParameterDef::from_raw(entry)?;
            if table.by_id.insert(def.id, table.params.len()).is_some() {
                return Err(SchemaError::invalid(
                    "userConfiguration",
                    format!("duplicate paramId {}", def.id),
                ));
            }
            table.params.push(def);
        }
        Ok(table)
    }

    /// Look up by id.
    pub fn get(&self, id: u32) -> Result<&ParameterDef> {
        self.by_id
            .get(&id)
            .map(|&i| &self.params[i])
            .ok_or_else(|| SchemaError::mismatch("parameter", id))
    }

    /// Look up by display name or argument.
    pub fn find(&self, name: &str) -> Result<&ParameterDef> {
        self.params
            .iter()
            .find(|p| p.matches_name(name))
            .ok_or_else(|| SchemaError::mismatch("parameter", name))
    }

    /// Parameters in document order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDef> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Position of a parameter in the table, as used by windowed block reads.
    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Parameter at a table position.
    pub fn at(&self, index: usize) -> Option<&ParameterDef> {
        self.params.get(index)
    }

    /// Category names in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for p in &self.params {
            if !seen.contains(&p.category.as_str()) {
                seen.push(&p.category);
            }
        }
        seen
    }

    /// Group ids by category, keeping first-seen category order and input order.
    pub fn group_by_category(&self, ids: &[u32]) -> Result<Vec<(String, Vec<u32>)>> {
        let mut groups: Vec<(String, Vec<u32>)> = Vec::new();
        for &id in ids {
            let def = self.get(id)?;
            match groups.iter_mut().find(|(c, _)| *c == def.category) {
                Some((_, members)) => members.push(id),
                None => groups.push((def.category.clone(), vec![id])),
            }
        }
        Ok(groups)
    }
}
