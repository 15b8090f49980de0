//! Parameter requests for each dialect.
//!
//! OpenIMU, OpenRTK and INS401 carry every value in an 8-byte slot next to a
//! 32-bit id. DMU packs 16-bit ids and 16-bit values, big endian, and keeps a
//! separate RAM (`SF`/`GF`) and EEPROM (`WF`/`RF`) copy. INS2000 has no
//! binary parameter interface.

use std::sync::Arc;

use navlink_protocol::{
    Command, FieldCodec, FieldType, FieldValue, Frame, Packet, PacketType, ProtocolError,
    DMU_GET_FIELDS,
    DMU_SET_FIELDS, DMU_WRITE_FIELDS, ETH_GET_PARAM, ETH_RESTORE_DEFAULTS, ETH_SAVE_CONFIG,
    ETH_SET_PARAM, GET_PARAM, GET_PARAM_BLOCK, RESTORE_DEFAULTS, SAVE_CONFIG, UPDATE_PARAM,
    UPDATE_PARAM_BLOCK,
};
use navlink_schema::{DeviceSchema, ParamValue, ParameterDef, PARAM_SLOT_SIZE};
use serde::Serialize;

use crate::dialect::DeviceDialect;
use crate::error::{DriverError, Result};

/// Table positions covered by one `gB` request.
pub const PARAMS_PER_BLOCK: usize = 30;

/// Entries per `uB` request.
pub const PARAMS_PER_UPDATE: usize = 20;

/// Fields per `GF`/`SF`/`WF` request.
pub const DMU_FIELDS_PER_REQUEST: usize = 60;

const DMU_VALUE_SIZE: usize = 2;

/// One parameter value read back from the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamReading {
    pub id: u32,
    pub name: String,
    pub value: ParamValue,
}

impl ParamReading {
    fn new(def: &ParameterDef, value: &FieldValue) -> Self {
        ParamReading {
            id: def.id,
            name: def.name.clone(),
            value: ParamValue::from_field(value),
        }
    }
}

impl DeviceDialect {
    fn unsupported(&self, operation: &'static str) -> DriverError {
        DriverError::Unsupported {
            operation,
            device: self.name(),
        }
    }

    /// Largest number of values one set request carries.
    pub fn max_params_per_set(&self) -> usize {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => PARAMS_PER_UPDATE,
            DeviceDialect::Dmu => DMU_FIELDS_PER_REQUEST,
            DeviceDialect::Ins401 | DeviceDialect::Ins2000 => 1,
        }
    }

    /// Read one parameter.
    pub fn get_param_command(&self, schema: &DeviceSchema, def: &ParameterDef) -> Result<Command> {
        let codec = schema.codec();
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => {
                Ok(Command::packet(GET_PARAM, put_u32(&codec, def.id)?))
            }
            DeviceDialect::Ins401 => Ok(Command::packet(ETH_GET_PARAM, put_u32(&codec, def.id)?)),
            DeviceDialect::Dmu => dmu_field_request(&codec, DMU_GET_FIELDS, &[def.id]),
            DeviceDialect::Ins2000 => Err(self.unsupported("get_param")),
        }
    }

    /// Decode the reply to [`get_param_command`](Self::get_param_command).
    pub fn parse_param_reply(
        &self,
        schema: &DeviceSchema,
        def: &ParameterDef,
        frame: &Frame,
    ) -> Result<ParamReading> {
        let packet = packet_of(frame, "get_param")?;
        let codec = schema.codec();
        match self {
            DeviceDialect::Dmu => {
                let pairs = dmu_pairs(&codec, packet)?;
                let (_, value) = pairs
                    .into_iter()
                    .find(|(id, _)| *id == def.id)
                    .ok_or_else(|| {
                        DriverError::unexpected("GF", format!("field {} missing from reply", def.id))
                    })?;
                Ok(ParamReading::new(def, &def.decode_slot(&codec, &value)?))
            }
            _ => {
                let (id, slot) = id_and_slot(&codec, &packet.payload)?;
                if id != def.id {
                    return Err(DriverError::unexpected(
                        packet.packet_type.to_string(),
                        format!("asked for parameter {}, got {}", def.id, id),
                    ));
                }
                Ok(ParamReading::new(def, &def.decode_slot(&codec, slot)?))
            }
        }
    }

    /// Write one or more validated values to the device's working copy.
    pub fn set_params_command(
        &self,
        schema: &DeviceSchema,
        values: &[(&ParameterDef, FieldValue)],
    ) -> Result<Command> {
        if values.len() > self.max_params_per_set() {
            return Err(ProtocolError::PayloadTooLong {
                max: self.max_params_per_set(),
                actual: values.len(),
            }
            .into());
        }
        let codec = schema.codec();
        match (self, values) {
            (DeviceDialect::Ins2000, _) => Err(self.unsupported("set_param")),
            (DeviceDialect::Dmu, _) => {
                let mut fields = Vec::with_capacity(values.len());
                for (def, value) in values {
                    fields.push((def.id, dmu_value(&codec, def, value)?));
                }
                dmu_field_write(&codec, DMU_SET_FIELDS, &fields)
            }
            (DeviceDialect::Ins401, [(def, value)]) => {
                let mut payload = put_u32(&codec, def.id)?;
                payload.extend_from_slice(&def.encode_slot(&codec, value)?);
                Ok(Command::packet(ETH_SET_PARAM, payload))
            }
            (_, [(def, value)]) => {
                let mut payload = put_u32(&codec, def.id)?;
                payload.extend_from_slice(&def.encode_slot(&codec, value)?);
                Ok(Command::packet(UPDATE_PARAM, payload))
            }
            _ => {
                let count = u32::try_from(values.len()).unwrap_or(u32::MAX);
                let mut payload = put_u32(&codec, count)?;
                for (def, value) in values {
                    payload.extend_from_slice(&put_u32(&codec, def.id)?);
                    payload.extend_from_slice(&def.encode_slot(&codec, value)?);
                }
                Ok(Command::packet(UPDATE_PARAM_BLOCK, payload))
            }
        }
    }

    /// Check the reply to a set, save, or restore request.
    ///
    /// Slot dialects answer with a 32-bit status where zero means success.
    /// DMU echoes the ids it accepted.
    pub fn check_write_reply(
        &self,
        schema: &DeviceSchema,
        expected_ids: &[u32],
        frame: &Frame,
    ) -> Result<()> {
        let packet = packet_of(frame, "write")?;
        let codec = schema.codec();
        match self {
            DeviceDialect::Dmu => {
                let ids = dmu_ids(&codec, packet)?;
                if ids.len() != expected_ids.len() || !expected_ids.iter().all(|id| ids.contains(id)) {
                    return Err(DriverError::unexpected(
                        packet.packet_type.to_string(),
                        format!("accepted fields {ids:?}, sent {expected_ids:?}"),
                    ));
                }
                Ok(())
            }
            _ => match packet.payload.get(..4) {
                // Some firmware acknowledges save/restore with an empty echo.
                None if packet.payload.is_empty() => Ok(()),
                None => Err(DriverError::unexpected(
                    packet.packet_type.to_string(),
                    format!("{} byte status", packet.payload.len()),
                )),
                Some(bytes) => match get_i32(&codec, bytes)? {
                    0 => Ok(()),
                    code => Err(DriverError::DeviceError {
                        command: packet.packet_type.to_string(),
                        code,
                    }),
                },
            },
        }
    }

    /// Whether saving needs the current working values as input.
    pub fn save_needs_snapshot(&self) -> bool {
        matches!(self, DeviceDialect::Dmu)
    }

    /// Persist the working configuration. DMU writes `snapshot` to EEPROM.
    pub fn save_config_command(
        &self,
        schema: &DeviceSchema,
        snapshot: &[ParamReading],
    ) -> Result<Command> {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => {
                Ok(Command::packet(SAVE_CONFIG, Vec::new()))
            }
            DeviceDialect::Ins401 => Ok(Command::packet(ETH_SAVE_CONFIG, Vec::new())),
            DeviceDialect::Dmu => {
                let codec = schema.codec();
                let mut fields = Vec::with_capacity(snapshot.len());
                for reading in snapshot {
                    let def = schema.parameter(reading.id)?;
                    let value = reading.value.to_field(def.field_type)?;
                    fields.push((def.id, dmu_value(&codec, def, &value)?));
                }
                dmu_field_write(&codec, DMU_WRITE_FIELDS, &fields)
            }
            DeviceDialect::Ins2000 => Err(self.unsupported("save_config")),
        }
    }

    /// Reset the device to factory values.
    pub fn restore_defaults_command(&self) -> Result<Command> {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => {
                Ok(Command::packet(RESTORE_DEFAULTS, Vec::new()))
            }
            DeviceDialect::Ins401 => Ok(Command::packet(ETH_RESTORE_DEFAULTS, Vec::new())),
            DeviceDialect::Dmu | DeviceDialect::Ins2000 => Err(self.unsupported("restore_defaults")),
        }
    }
}

/// One request of a paged parameter read.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Page {
    /// `gB`: table positions `start..=end`.
    Block { start: u8, end: u8 },
    /// Explicit ids (`GF` batches, single INS401 reads).
    Ids(Vec<u32>),
}

/// Reads the whole parameter table, one page per transaction.
///
/// ```rust,ignore
/// let mut seq = GetParamsSequence::new(dialect, schema)?;
/// while let Some(command) = seq.next_command() {
///     let reply = center.send(command?, timeout)?;
///     seq.accept(&reply)?;
/// }
/// let readings = seq.into_readings();
/// ```
#[derive(Debug)]
pub struct GetParamsSequence {
    dialect: DeviceDialect,
    schema: Arc<DeviceSchema>,
    pages: Vec<Page>,
    step: usize,
    accumulated: Vec<ParamReading>,
}

impl GetParamsSequence {
    pub fn new(dialect: DeviceDialect, schema: Arc<DeviceSchema>) -> Result<Self> {
        let table = schema.parameters();
        let readable: Vec<u32> = table.iter().filter(|p| p.is_readable()).map(|p| p.id).collect();
        let pages = match dialect {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => {
                let last = table.len().min(usize::from(u8::MAX) + 1);
                if table.len() > last {
                    tracing::warn!(
                        "parameter table has {} entries, reading the first {}",
                        table.len(),
                        last
                    );
                }
                (0..last)
                    .step_by(PARAMS_PER_BLOCK)
                    .map(|start| Page::Block {
                        start: start as u8,
                        end: ((start + PARAMS_PER_BLOCK).min(last) - 1) as u8,
                    })
                    .collect()
            }
            DeviceDialect::Dmu => readable
                .chunks(DMU_FIELDS_PER_REQUEST)
                .map(|ids| Page::Ids(ids.to_vec()))
                .collect(),
            DeviceDialect::Ins401 => readable.into_iter().map(|id| Page::Ids(vec![id])).collect(),
            DeviceDialect::Ins2000 => return Err(dialect.unsupported("get_params")),
        };
        Ok(GetParamsSequence {
            dialect,
            schema,
            pages,
            step: 0,
            accumulated: Vec::new(),
        })
    }

    /// Request for the current page, `None` once every page is read.
    pub fn next_command(&self) -> Option<Result<Command>> {
        let page = self.pages.get(self.step)?;
        let codec = self.schema.codec();
        Some(match page {
            Page::Block { start, end } => Ok(Command::packet(GET_PARAM_BLOCK, vec![*start, *end])),
            Page::Ids(ids) if self.dialect == DeviceDialect::Dmu => {
                dmu_field_request(&codec, DMU_GET_FIELDS, ids)
            }
            Page::Ids(ids) => match self.schema.parameter(ids[0]) {
                Ok(def) => self.dialect.get_param_command(&self.schema, def),
                Err(e) => Err(e.into()),
            },
        })
    }

    /// Consume the reply to the current page and advance.
    pub fn accept(&mut self, frame: &Frame) -> Result<()> {
        let Some(page) = self.pages.get(self.step) else {
            return Err(DriverError::unexpected("get_params", "reply after the last page"));
        };
        let codec = self.schema.codec();
        let table = self.schema.parameters();
        match page {
            Page::Block { start, end } => {
                let packet = packet_of(frame, "gB")?;
                let header = packet.payload.get(..2).ok_or_else(|| {
                    DriverError::unexpected("gB", format!("{} byte reply", packet.payload.len()))
                })?;
                if header != [*start, *end] {
                    return Err(DriverError::unexpected(
                        "gB",
                        format!("asked for {start}..={end}, got {}..={}", header[0], header[1]),
                    ));
                }
                let slots = packet.payload[2..].chunks_exact(PARAM_SLOT_SIZE);
                for (index, slot) in (usize::from(*start)..=usize::from(*end)).zip(slots) {
                    let Some(def) = table.at(index) else { break };
                    if def.is_readable() {
                        let value = def.decode_slot(&codec, slot)?;
                        self.accumulated.push(ParamReading::new(def, &value));
                    }
                }
            }
            Page::Ids(ids) if self.dialect == DeviceDialect::Dmu => {
                let packet = packet_of(frame, "GF")?;
                for (id, value) in dmu_pairs(&codec, packet)? {
                    if !ids.contains(&id) {
                        tracing::debug!("ignoring unrequested field {}", id);
                        continue;
                    }
                    let def = table.get(id)?;
                    let value = def.decode_slot(&codec, &value)?;
                    self.accumulated.push(ParamReading::new(def, &value));
                }
            }
            Page::Ids(ids) => {
                let def = table.get(ids[0])?;
                let reading = self.dialect.parse_param_reply(&self.schema, def, frame)?;
                self.accumulated.push(reading);
            }
        }
        self.step += 1;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.step >= self.pages.len()
    }

    /// Pages answered so far and the total.
    pub fn progress(&self) -> (usize, usize) {
        (self.step, self.pages.len())
    }

    pub fn into_readings(self) -> Vec<ParamReading> {
        self.accumulated
    }
}

fn packet_of<'a>(frame: &'a Frame, command: &str) -> Result<&'a Packet> {
    match frame {
        Frame::Packet(p) => Ok(p),
        other => Err(DriverError::unexpected(command, format!("non-packet reply {other:?}"))),
    }
}

fn put_u32(codec: &FieldCodec, value: u32) -> Result<Vec<u8>> {
    Ok(codec.encode(FieldType::U32, &FieldValue::UInt(u64::from(value)))?)
}

fn get_u32(codec: &FieldCodec, bytes: &[u8]) -> Result<u32> {
    match codec.decode(FieldType::U32, bytes)? {
        FieldValue::UInt(v) => Ok(v as u32),
        other => Err(DriverError::unexpected("u32", other.to_string())),
    }
}

fn get_i32(codec: &FieldCodec, bytes: &[u8]) -> Result<i32> {
    match codec.decode(FieldType::I32, bytes)? {
        FieldValue::Int(v) => Ok(v as i32),
        other => Err(DriverError::unexpected("i32", other.to_string())),
    }
}

/// `<id:4> <slot:8>`
fn id_and_slot<'a>(codec: &FieldCodec, payload: &'a [u8]) -> Result<(u32, &'a [u8])> {
    let needed = 4 + PARAM_SLOT_SIZE;
    if payload.len() < needed {
        return Err(ProtocolError::FrameTooShort {
            expected: needed,
            actual: payload.len(),
        }
        .into());
    }
    Ok((get_u32(codec, &payload[..4])?, &payload[4..needed]))
}

fn dmu_id(codec: &FieldCodec, id: u32) -> Result<Vec<u8>> {
    Ok(codec.encode(FieldType::U16, &FieldValue::UInt(u64::from(id)))?)
}

fn dmu_count(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| {
        ProtocolError::PayloadTooLong {
            max: DMU_FIELDS_PER_REQUEST,
            actual: len,
        }
        .into()
    })
}

/// `<count:1> <id:2>*`
fn dmu_field_request(codec: &FieldCodec, packet_type: PacketType, ids: &[u32]) -> Result<Command> {
    let mut payload = vec![dmu_count(ids.len())?];
    for &id in ids {
        payload.extend_from_slice(&dmu_id(codec, id)?);
    }
    Ok(Command::packet(packet_type, payload))
}

/// `<count:1> (<id:2> <value:2>)*`
fn dmu_field_write(
    codec: &FieldCodec,
    packet_type: PacketType,
    fields: &[(u32, [u8; DMU_VALUE_SIZE])],
) -> Result<Command> {
    let mut payload = vec![dmu_count(fields.len())?];
    for (id, value) in fields {
        payload.extend_from_slice(&dmu_id(codec, *id)?);
        payload.extend_from_slice(value);
    }
    Ok(Command::packet(packet_type, payload))
}

fn dmu_value(codec: &FieldCodec, def: &ParameterDef, value: &FieldValue) -> Result<[u8; DMU_VALUE_SIZE]> {
    let bytes = codec.encode(def.field_type, value)?;
    <[u8; DMU_VALUE_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| ProtocolError::field_encode(def.field_type.name(), value).into())
}

/// Reply to `GF`: `<count:1> (<id:2> <value:2>)*`
fn dmu_pairs(codec: &FieldCodec, packet: &Packet) -> Result<Vec<(u32, Vec<u8>)>> {
    let (count, body) = dmu_body(packet, 4)?;
    body.chunks_exact(4)
        .take(count)
        .map(|pair| {
            let id = codec.decode(FieldType::U16, &pair[..2])?;
            Ok((field_u32(&id), pair[2..].to_vec()))
        })
        .collect()
}

/// Reply to `SF`/`WF`: `<count:1> <id:2>*`
fn dmu_ids(codec: &FieldCodec, packet: &Packet) -> Result<Vec<u32>> {
    let (count, body) = dmu_body(packet, 2)?;
    body.chunks_exact(2)
        .take(count)
        .map(|id| Ok(field_u32(&codec.decode(FieldType::U16, id)?)))
        .collect()
}

fn dmu_body(packet: &Packet, entry: usize) -> Result<(usize, &[u8])> {
    let (&count, body) = packet.payload.split_first().ok_or(ProtocolError::FrameTooShort {
        expected: 1,
        actual: 0,
    })?;
    let count = usize::from(count);
    if body.len() < count * entry {
        return Err(ProtocolError::FrameTooShort {
            expected: 1 + count * entry,
            actual: packet.payload.len(),
        }
        .into());
    }
    Ok((count, body))
}

fn field_u32(value: &FieldValue) -> u32 {
    match value {
        FieldValue::UInt(v) => *v as u32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navlink_protocol::{CommandBody, Endian, NAK};

    fn schema(name: &str) -> Arc<DeviceSchema> {
        Arc::new(DeviceSchema::builtin(name).unwrap())
    }

    fn payload(cmd: &Command) -> &[u8] {
        match &cmd.body {
            CommandBody::Packet { payload, .. } => payload,
            CommandBody::Text(_) => panic!("text command"),
        }
    }

    fn reply(cmd: &Command, payload: Vec<u8>) -> Frame {
        Frame::Packet(Packet::new(cmd.packet_type().unwrap(), payload))
    }

    #[test]
    fn test_openimu_get_param_round_trip() {
        let schema = schema("openimu");
        let def = schema.parameter_by_name("baud_rate").unwrap();
        let cmd = DeviceDialect::OpenImu.get_param_command(&schema, def).unwrap();
        assert_eq!(cmd.packet_type(), Some(GET_PARAM));
        assert_eq!(payload(&cmd), &2u32.to_le_bytes());

        let mut body = 2u32.to_le_bytes().to_vec();
        body.extend_from_slice(&115_200i64.to_le_bytes());
        let reading = DeviceDialect::OpenImu
            .parse_param_reply(&schema, def, &reply(&cmd, body))
            .unwrap();
        assert_eq!(reading.value, ParamValue::Integer(115_200));
        assert_eq!(reading.name, "Baud Rate");
    }

    #[test]
    fn test_reply_for_other_param_is_rejected() {
        let schema = schema("openimu");
        let def = schema.parameter_by_name("baud_rate").unwrap();
        let cmd = DeviceDialect::OpenImu.get_param_command(&schema, def).unwrap();
        let mut body = 4u32.to_le_bytes().to_vec();
        body.extend_from_slice(&[0; 8]);
        let err = DeviceDialect::OpenImu
            .parse_param_reply(&schema, def, &reply(&cmd, body))
            .unwrap_err();
        assert!(matches!(err, DriverError::UnexpectedResponse { .. }));
    }

    #[test]
    fn test_single_and_block_update_layout() {
        let schema = schema("openimu");
        let baud = schema.parameter_by_name("baud_rate").unwrap();
        let rate = schema.parameter_by_name("packet_rate").unwrap();

        let single = DeviceDialect::OpenImu
            .set_params_command(&schema, &[(baud, FieldValue::Int(57_600))])
            .unwrap();
        assert_eq!(single.packet_type(), Some(UPDATE_PARAM));
        assert_eq!(payload(&single).len(), 12);

        let block = DeviceDialect::OpenImu
            .set_params_command(
                &schema,
                &[(baud, FieldValue::Int(57_600)), (rate, FieldValue::Int(50))],
            )
            .unwrap();
        assert_eq!(block.packet_type(), Some(UPDATE_PARAM_BLOCK));
        assert_eq!(&payload(&block)[..4], &2u32.to_le_bytes());
        assert_eq!(payload(&block).len(), 4 + 2 * 12);
    }

    #[test]
    fn test_write_status() {
        let schema = schema("openimu");
        let cmd = Command::packet(UPDATE_PARAM, vec![]);
        let ok = reply(&cmd, 0i32.to_le_bytes().to_vec());
        DeviceDialect::OpenImu.check_write_reply(&schema, &[2], &ok).unwrap();

        let failed = reply(&cmd, (-3i32).to_le_bytes().to_vec());
        let err = DeviceDialect::OpenImu
            .check_write_reply(&schema, &[2], &failed)
            .unwrap_err();
        assert!(matches!(err, DriverError::DeviceError { code: -3, .. }));

        let nak = Frame::Packet(Packet::new(NAK, b"uP".to_vec()));
        assert!(DeviceDialect::OpenImu.check_write_reply(&schema, &[2], &nak).is_err());
    }

    #[test]
    fn test_block_read_skips_disabled() {
        let schema = schema("openimu");
        let mut seq = GetParamsSequence::new(DeviceDialect::OpenImu, Arc::clone(&schema)).unwrap();
        assert_eq!(seq.progress(), (0, 1));

        let cmd = seq.next_command().unwrap().unwrap();
        let count = schema.parameters().len();
        assert_eq!(payload(&cmd), &[0, count as u8 - 1]);

        let codec = FieldCodec::new(Endian::Little);
        let mut body = vec![0, count as u8 - 1];
        for def in schema.parameters().iter() {
            let slot = match def.field_type {
                FieldType::Char(_) => [b'z', b'1', 0, 0, 0, 0, 0, 0],
                _ => {
                    let mut slot = [0u8; 8];
                    let bytes = codec.encode(def.field_type, &FieldValue::Int(def.id as i64)).unwrap();
                    slot[..bytes.len()].copy_from_slice(&bytes);
                    slot
                }
            };
            body.extend_from_slice(&slot);
        }
        seq.accept(&reply(&cmd, body)).unwrap();
        assert!(seq.is_done());
        assert!(seq.next_command().is_none());

        let readings = seq.into_readings();
        let readable = schema.parameters().iter().filter(|p| p.is_readable()).count();
        assert_eq!(readings.len(), readable);
        assert!(readings.iter().all(|r| r.id >= 2));
        assert_eq!(readings[0].value, ParamValue::Integer(2));
    }

    #[test]
    fn test_block_reply_for_other_window_is_rejected() {
        let schema = schema("openimu");
        let mut seq = GetParamsSequence::new(DeviceDialect::OpenImu, schema).unwrap();
        let cmd = seq.next_command().unwrap().unwrap();
        let err = seq.accept(&reply(&cmd, vec![5, 6])).unwrap_err();
        assert!(matches!(err, DriverError::UnexpectedResponse { .. }));
        assert!(!seq.is_done());
    }

    #[test]
    fn test_dmu_fields_are_big_endian_pairs() {
        let schema = schema("dmu");
        let divider = schema.parameter_by_name("packet_rate_divider").unwrap();
        let cmd = DeviceDialect::Dmu
            .set_params_command(&schema, &[(divider, FieldValue::UInt(2))])
            .unwrap();
        assert_eq!(cmd.packet_type(), Some(DMU_SET_FIELDS));
        assert_eq!(payload(&cmd), &[1, 0x00, 0x01, 0x00, 0x02]);

        let ack = reply(&cmd, vec![1, 0x00, 0x01]);
        DeviceDialect::Dmu.check_write_reply(&schema, &[1], &ack).unwrap();
        let partial = reply(&cmd, vec![0]);
        assert!(DeviceDialect::Dmu.check_write_reply(&schema, &[1], &partial).is_err());

        let get = DeviceDialect::Dmu.get_param_command(&schema, divider).unwrap();
        assert_eq!(payload(&get), &[1, 0x00, 0x01]);
        let value = reply(&get, vec![1, 0x00, 0x01, 0x00, 0x05]);
        let reading = DeviceDialect::Dmu.parse_param_reply(&schema, divider, &value).unwrap();
        assert_eq!(reading.value, ParamValue::Integer(5));
    }

    #[test]
    fn test_dmu_save_writes_snapshot() {
        let schema = schema("dmu");
        let snapshot = vec![ParamReading {
            id: 1,
            name: "Packet Rate Divider".into(),
            value: ParamValue::Integer(4),
        }];
        assert!(DeviceDialect::Dmu.save_needs_snapshot());
        let cmd = DeviceDialect::Dmu.save_config_command(&schema, &snapshot).unwrap();
        assert_eq!(cmd.packet_type(), Some(DMU_WRITE_FIELDS));
        assert_eq!(payload(&cmd), &[1, 0x00, 0x01, 0x00, 0x04]);
        assert!(DeviceDialect::Dmu.restore_defaults_command().is_err());
    }

    #[test]
    fn test_ins401_reads_one_param_per_page() {
        let schema = schema("ins401");
        let seq = GetParamsSequence::new(DeviceDialect::Ins401, Arc::clone(&schema)).unwrap();
        let readable = schema.parameters().iter().filter(|p| p.is_readable()).count();
        assert_eq!(seq.progress(), (0, readable));
        let cmd = seq.next_command().unwrap().unwrap();
        assert_eq!(cmd.packet_type(), Some(ETH_GET_PARAM));
    }

    #[test]
    fn test_ins2000_has_no_params() {
        let schema = schema("ins2000");
        assert!(GetParamsSequence::new(DeviceDialect::Ins2000, schema).is_err());
        assert!(matches!(
            DeviceDialect::Ins2000.restore_defaults_command(),
            Err(DriverError::Unsupported { .. })
        ));
    }
}
