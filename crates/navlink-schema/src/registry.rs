//! Packet registry: packet type to payload layout.

use navlink_protocol::{FieldCodec, FieldType, FieldValue, PacketType, ProtocolError};

use crate::document::{RawBootloaderMessage, RawField, RawInputPacket, RawOutputPacket, RawUserMessages};
use crate::error::{Result, SchemaError};

/// One named field of a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutField {
    pub name: String,
    pub field_type: FieldType,
    pub unit: Option<String>,
}

impl LayoutField {
    fn from_raw(raw: &RawField, context: &str) -> Result<Self> {
        let field_type = FieldType::parse(&raw.field_type)
            .map_err(|e| SchemaError::invalid(format!("{context} field '{}'", raw.name), e.to_string()))?;
        Ok(LayoutField {
            name: raw.name.clone(),
            field_type,
            unit: raw.unit.clone(),
        })
    }
}

/// A field value together with its layout entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub name: String,
    pub unit: Option<String>,
    pub value: FieldValue,
}

/// Ordered sequence of fields making up a payload.
///
/// Only the last field may be variable length; it takes the remaining bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketLayout {
    pub fields: Vec<LayoutField>,
}

impl PacketLayout {
    fn from_raw(raw: &[RawField], context: &str) -> Result<Self> {
        let fields = raw
            .iter()
            .map(|f| LayoutField::from_raw(f, context))
            .collect::<Result<Vec<_>>>()?;
        if let Some(pos) = fields.iter().position(|f| f.field_type.width().is_none()) {
            if pos + 1 != fields.len() {
                return Err(SchemaError::invalid(
                    context,
                    format!("variable length field '{}' must be last", fields[pos].name),
                ));
            }
        }
        Ok(PacketLayout { fields })
    }

    /// Fixed payload size, `None` when the last field is variable length.
    pub fn size(&self) -> Option<usize> {
        self.fields.iter().map(|f| f.field_type.width()).sum()
    }

    /// Decode a payload field by field.
    pub fn decode(&self, codec: &FieldCodec, payload: &[u8]) -> Result<Vec<DecodedField>> {
        let mut offset = 0;
        let mut out = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let end = match field.field_type.width() {
                Some(width) => offset + width,
                None => payload.len(),
            };
            let bytes = payload.get(offset..end).ok_or_else(|| {
                ProtocolError::field_decode(
                    field.field_type.name(),
                    end - offset,
                    payload.len().saturating_sub(offset),
                )
            })?;
            out.push(DecodedField {
                name: field.name.clone(),
                unit: field.unit.clone(),
                value: codec.decode(field.field_type, bytes)?,
            });
            offset = end;
        }
        if offset < payload.len() {
            log::debug!("{} trailing bytes after layout", payload.len() - offset);
        }
        Ok(out)
    }

    /// Encode values in layout order.
    pub fn encode(&self, codec: &FieldCodec, values: &[FieldValue]) -> Result<Vec<u8>> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::invalid(
                "payload",
                format!("expected {} values, got {}", self.fields.len(), values.len()),
            ));
        }
        let mut buf = Vec::with_capacity(self.size().unwrap_or(64));
        for (field, value) in self.fields.iter().zip(values) {
            codec.encode_into(field.field_type, value, &mut buf)?;
        }
        Ok(buf)
    }
}

/// A packet the device emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPacketDef {
    pub packet_type: PacketType,
    pub name: String,
    pub description: Option<String>,
    pub layout: PacketLayout,
}

/// A request the host sends, with the shape of its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPacketDef {
    pub packet_type: PacketType,
    pub name: String,
    pub description: Option<String>,
    pub argument: Option<LayoutField>,
    pub response: PacketLayout,
}

/// A bootloader command the application accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderMessageDef {
    pub packet_type: PacketType,
    pub name: String,
}

fn packet_type_of(name: &str, explicit: Option<&str>, context: &str) -> Result<PacketType> {
    PacketType::parse(explicit.unwrap_or(name))
        .map_err(|e| SchemaError::invalid(format!("{context} '{name}'"), e.to_string()))
}

/// Packet lookups for one schema.
#[derive(Debug, Clone, Default)]
pub struct PacketRegistry {
    outputs: Vec<OutputPacketDef>,
    inputs: Vec<InputPacketDef>,
    bootloader: Vec<BootloaderMessageDef>,
}

impl PacketRegistry {
    pub(crate) fn from_raw(
        messages: &RawUserMessages,
        bootloader: &[RawBootloaderMessage],
    ) -> Result<Self> {
        let outputs = messages
            .output_packets
            .iter()
            .map(Self::output_from_raw)
            .collect::<Result<Vec<_>>>()?;
        let inputs = messages
            .input_packets
            .iter()
            .map(Self::input_from_raw)
            .collect::<Result<Vec<_>>>()?;
        let bootloader = bootloader
            .iter()
            .map(|raw| {
                Ok(BootloaderMessageDef {
                    packet_type: packet_type_of(&raw.name, raw.packet_type.as_deref(), "bootloader message")?,
                    name: raw.name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (i, def) in outputs.iter().enumerate() {
            if outputs[..i].iter().any(|o| o.packet_type == def.packet_type) {
                return Err(SchemaError::invalid(
                    "outputPackets",
                    format!("duplicate packet type {}", def.packet_type),
                ));
            }
        }

        Ok(PacketRegistry {
            outputs,
            inputs,
            bootloader,
        })
    }

    fn output_from_raw(raw: &RawOutputPacket) -> Result<OutputPacketDef> {
        let context = format!("output packet '{}'", raw.name);
        Ok(OutputPacketDef {
            packet_type: packet_type_of(&raw.name, raw.packet_type.as_deref(), "output packet")?,
            name: raw.name.clone(),
            description: raw.description.clone(),
            layout: PacketLayout::from_raw(&raw.payload, &context)?,
        })
    }

    fn input_from_raw(raw: &RawInputPacket) -> Result<InputPacketDef> {
        let context = format!("input packet '{}'", raw.name);
        Ok(InputPacketDef {
            packet_type: packet_type_of(&raw.name, raw.packet_type.as_deref(), "input packet")?,
            name: raw.name.clone(),
            description: raw.description.clone(),
            argument: raw
                .input_payload
                .as_ref()
                .map(|f| LayoutField::from_raw(f, &context))
                .transpose()?,
            response: PacketLayout::from_raw(&raw.response_payload, &context)?,
        })
    }

    /// Output packet by wire type.
    pub fn output(&self, packet_type: PacketType) -> Result<&OutputPacketDef> {
        self.outputs
            .iter()
            .find(|o| o.packet_type == packet_type)
            .ok_or_else(|| SchemaError::mismatch("output packet", packet_type))
    }

    /// Output packet by name (case-sensitive; `z1` and `Z1` differ).
    pub fn output_by_name(&self, name: &str) -> Result<&OutputPacketDef> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| SchemaError::mismatch("output packet", name))
    }

    /// Whether a packet type is streamed telemetry.
    pub fn is_output(&self, packet_type: PacketType) -> bool {
        self.outputs.iter().any(|o| o.packet_type == packet_type)
    }

    /// Input packet by wire type.
    pub fn input(&self, packet_type: PacketType) -> Result<&InputPacketDef> {
        self.inputs
            .iter()
            .find(|i| i.packet_type == packet_type)
            .ok_or_else(|| SchemaError::mismatch("input packet", packet_type))
    }

    /// Input packet by name.
    pub fn input_by_name(&self, name: &str) -> Result<&InputPacketDef> {
        self.inputs
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| SchemaError::mismatch("input packet", name))
    }

    /// Bootloader command by name (`JI`, `JA`, `WA`).
    pub fn bootloader(&self, name: &str) -> Result<&BootloaderMessageDef> {
        self.bootloader
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| SchemaError::mismatch("bootloader message", name))
    }

    /// Whether the application declares any bootloader commands.
    pub fn supports_bootloader(&self) -> bool {
        !self.bootloader.is_empty()
    }

    pub fn outputs(&self) -> &[OutputPacketDef] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[InputPacketDef] {
        &self.inputs
    }
}
