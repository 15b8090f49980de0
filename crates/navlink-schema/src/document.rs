//! Raw JSON shape of a device application schema.
//!
//! These types mirror the document one-to-one and are validated into
//! [`DeviceSchema`](crate::DeviceSchema) before use. Field names follow the
//! camelCase spelling of the files shipped with device firmware.

use serde::{Deserialize, Serialize};

use crate::value::ParamValue;

// ============================================================================
// Document root
// ============================================================================

/// Root of a schema file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    /// Device application the document describes (`"OpenIMU300ZI INS"`).
    #[serde(default)]
    pub name: Option<String>,
    /// Application version string the document was written for.
    #[serde(default)]
    pub app_version: Option<String>,
    /// Dialect tag (`openimu`, `openrtk`, `dmu`, `ins2000`, `ins401`).
    #[serde(rename = "type")]
    pub device_type: String,
    /// Byte order of payload fields, `little` unless stated.
    #[serde(default)]
    pub endian: EndianTag,
    /// Parameter table.
    #[serde(default)]
    pub user_configuration: Vec<RawParameter>,
    /// Packet layouts.
    #[serde(default)]
    pub user_messages: RawUserMessages,
    /// Bootloader commands the application accepts.
    #[serde(default)]
    pub bootloader_messages: Vec<RawBootloaderMessage>,
    /// Commands surfaced to the command line.
    #[serde(default, rename = "CLICommands")]
    pub cli_commands: Vec<RawCliCommand>,
}

/// Byte order spelling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndianTag {
    #[default]
    Little,
    Big,
}

// ============================================================================
// Parameters
// ============================================================================

/// One `userConfiguration` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParameter {
    pub param_id: u32,
    #[serde(default)]
    pub category: Option<String>,
    /// `disabled` or `read_only` hide the parameter from writes.
    #[serde(default)]
    pub param_type: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    /// Short command-line name.
    #[serde(default)]
    pub argument: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<ParamValue>>,
    #[serde(default)]
    pub range: Option<RawRange>,
}

/// Inclusive numeric bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RawRange {
    pub min: f64,
    pub max: f64,
}

// ============================================================================
// Packets
// ============================================================================

/// `userMessages` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUserMessages {
    #[serde(default)]
    pub input_packets: Vec<RawInputPacket>,
    #[serde(default)]
    pub output_packets: Vec<RawOutputPacket>,
}

/// One payload field of a packet layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

/// A request the host can send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInputPacket {
    /// Two-letter mnemonic, also the wire type unless `packetType` is given.
    pub name: String,
    #[serde(default)]
    pub packet_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Scalar argument carried by the request, if any.
    #[serde(default)]
    pub input_payload: Option<RawField>,
    /// Layout of the reply payload.
    #[serde(default)]
    pub response_payload: Vec<RawField>,
}

/// A packet the device streams or returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutputPacket {
    pub name: String,
    #[serde(default)]
    pub packet_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payload: Vec<RawField>,
}

/// A `bootloaderMessages` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBootloaderMessage {
    pub name: String,
    #[serde(default)]
    pub packet_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A `CLICommands` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCliCommand {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}
