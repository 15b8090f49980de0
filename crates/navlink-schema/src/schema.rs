//! The validated, read-only device schema.

use std::fs;
use std::path::Path;

use navlink_protocol::{Endian, FieldCodec, PacketType};

use crate::document::{EndianTag, SchemaDocument};
use crate::error::{Result, SchemaError};
use crate::parameter::{ParameterDef, ParameterTable};
use crate::registry::{InputPacketDef, OutputPacketDef, PacketRegistry};

/// Names accepted by [`DeviceSchema::builtin`].
pub const BUILTIN_SCHEMAS: [&str; 5] = ["openimu", "openrtk", "dmu", "ins2000", "ins401"];

fn builtin_source(name: &str) -> Option<&'static str> {
    Some(match name {
        "openimu" => include_str!("../schemas/openimu.json"),
        "openrtk" => include_str!("../schemas/openrtk.json"),
        "dmu" => include_str!("../schemas/dmu.json"),
        "ins2000" => include_str!("../schemas/ins2000.json"),
        "ins401" => include_str!("../schemas/ins401.json"),
        _ => return None,
    })
}

/// A command-line command the application exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCommandDef {
    pub name: String,
    pub description: Option<String>,
}

/// Parameter table and packet layouts for one device application.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DeviceSchema {
    name: String,
    app_version: Option<String>,
    device_type: String,
    endian: Endian,
    parameters: ParameterTable,
    packets: PacketRegistry,
    cli_commands: Vec<CliCommandDef>,
}

impl DeviceSchema {
    /// Validate a parsed document.
    pub fn from_document(doc: &SchemaDocument) -> Result<Self> {
        let device_type = doc.device_type.trim().to_ascii_lowercase();
        if device_type.is_empty() {
            return Err(SchemaError::invalid("document", "missing type"));
        }
        let schema = DeviceSchema {
            name: doc.name.clone().unwrap_or_else(|| device_type.clone()),
            app_version: doc.app_version.clone(),
            endian: match doc.endian {
                EndianTag::Little => Endian::Little,
                EndianTag::Big => Endian::Big,
            },
            parameters: ParameterTable::from_raw(&doc.user_configuration)?,
            packets: PacketRegistry::from_raw(&doc.user_messages, &doc.bootloader_messages)?,
            cli_commands: doc
                .cli_commands
                .iter()
                .map(|c| CliCommandDef {
                    name: c.name.clone(),
                    description: c.description.clone(),
                })
                .collect(),
            device_type,
        };
        log::debug!(
            "loaded schema '{}': {} parameters, {} output packets",
            schema.name,
            schema.parameters.len(),
            schema.packets.outputs().len()
        );
        Ok(schema)
    }

    /// Parse and validate JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(json)?;
        Self::from_document(&doc)
    }

    /// Load a schema file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// One of the embedded schemas (see [`BUILTIN_SCHEMAS`]).
    pub fn builtin(name: &str) -> Result<Self> {
        let key = name.trim().to_ascii_lowercase();
        let json = builtin_source(&key).ok_or_else(|| SchemaError::UnknownBuiltin(name.to_string()))?;
        Self::from_json_str(json)
    }

    /// `<dir>/<name>.json` when present, the embedded schema otherwise.
    pub fn resolve(dir: Option<&Path>, name: &str) -> Result<Self> {
        if let Some(dir) = dir {
            let path = dir.join(format!("{}.json", name.to_ascii_lowercase()));
            if path.is_file() {
                log::info!("using schema {}", path.display());
                return Self::load(&path);
            }
        }
        Self::builtin(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }

    /// Lowercase dialect tag.
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Field codec using the schema's byte order.
    pub fn codec(&self) -> FieldCodec {
        FieldCodec::new(self.endian)
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Parameter by id, or `SchemaMismatch`.
    pub fn parameter(&self, id: u32) -> Result<&ParameterDef> {
        self.parameters.get(id)
    }

    /// Parameter by display name or argument, or `SchemaMismatch`.
    pub fn parameter_by_name(&self, name: &str) -> Result<&ParameterDef> {
        self.parameters.find(name)
    }

    pub fn categories(&self) -> Vec<&str> {
        self.parameters.categories()
    }

    pub fn packets(&self) -> &PacketRegistry {
        &self.packets
    }

    pub fn output_packet(&self, packet_type: PacketType) -> Result<&OutputPacketDef> {
        self.packets.output(packet_type)
    }

    pub fn input_packet(&self, packet_type: PacketType) -> Result<&InputPacketDef> {
        self.packets.input(packet_type)
    }

    pub fn cli_commands(&self) -> &[CliCommandDef] {
        &self.cli_commands
    }
}
