//! Device families and their identity protocols.
//!
//! Each supported family is a [`DeviceDialect`] variant. The dialect is
//! picked once, when discovery classifies the device, and fixes the wire
//! format, the identity and version requests, the schema, and the firmware
//! upgrade chain for the rest of the session.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use navlink_protocol::{
    BootloaderCommandSet, Command, EthernetConfig, Frame, MacAddress, ResponseMatcher, WireFormat,
    DMU_GET_PACKET, DMU_ID, DMU_VERSION, ETH_PING, GET_VERSION, INS2000_MARKER,
    INS2000_VERSION_COMMAND, INS401_MARKER, OPENIMU_MARKER, OPENRTK_MARKER, PING,
};
use navlink_schema::{DeviceSchema, SchemaError};
use serde::{Deserialize, Serialize};

use crate::config::UpgradeConfig;
use crate::device_info::{AppInfo, DeviceInfo};
use crate::error::{DriverError, Result, UpgradeError};
use crate::upgrade::firmware::{FirmwareImage, SectionKind};
use crate::upgrade::workers::{FirmwareWriteWorker, JumpApplicationWorker, JumpBootloaderWorker};
use crate::upgrade::{UpgradeLink, UpgradeWorker, WorkerGroup};

/// Core selector sent with the bootloader jump when targeting the IMU of an
/// OpenRTK board.
pub const IMU_CORE_SELECTOR: u8 = 0x01;

/// The supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDialect {
    OpenImu,
    OpenRtk,
    Dmu,
    Ins2000,
    Ins401,
}

impl DeviceDialect {
    pub const ALL: [DeviceDialect; 5] = [
        DeviceDialect::OpenRtk,
        DeviceDialect::OpenImu,
        DeviceDialect::Dmu,
        DeviceDialect::Ins2000,
        DeviceDialect::Ins401,
    ];

    /// Families reachable over a serial port, in probing order.
    pub const SERIAL: [DeviceDialect; 4] = [
        DeviceDialect::OpenRtk,
        DeviceDialect::OpenImu,
        DeviceDialect::Dmu,
        DeviceDialect::Ins2000,
    ];

    /// Lowercase tag used in schemas, config and the last-connection record.
    pub const fn name(&self) -> &'static str {
        match self {
            DeviceDialect::OpenImu => "openimu",
            DeviceDialect::OpenRtk => "openrtk",
            DeviceDialect::Dmu => "dmu",
            DeviceDialect::Ins2000 => "ins2000",
            DeviceDialect::Ins401 => "ins401",
        }
    }

    /// Substring identifying this family in identity replies.
    pub const fn marker(&self) -> &'static str {
        match self {
            DeviceDialect::OpenImu => OPENIMU_MARKER,
            DeviceDialect::OpenRtk => OPENRTK_MARKER,
            DeviceDialect::Dmu => navlink_protocol::DMU_MARKER,
            DeviceDialect::Ins2000 => INS2000_MARKER,
            DeviceDialect::Ins401 => INS401_MARKER,
        }
    }

    /// Whether the family talks raw Ethernet frames rather than a byte stream.
    pub const fn is_ethernet(&self) -> bool {
        matches!(self, DeviceDialect::Ins401)
    }

    /// Framing used while probing: the identity exchange never needs NMEA.
    pub fn probe_format(&self, host_mac: Option<MacAddress>) -> WireFormat {
        match self {
            DeviceDialect::OpenRtk => WireFormat::uart(),
            _ => self.wire_format(host_mac),
        }
    }
}

impl fmt::Display for DeviceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceDialect {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        DeviceDialect::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(key))
            .ok_or_else(|| DriverError::Schema(SchemaError::UnknownBuiltin(key.to_string())))
    }
}

/// What every device family implements.
pub trait DeviceProtocol {
    /// Framing for a session with this family.
    fn wire_format(&self, host_mac: Option<MacAddress>) -> WireFormat;

    /// Identity request.
    fn ping_command(&self) -> Command;

    /// Classify a reply to [`ping_command`](Self::ping_command).
    fn ping(&self, frame: &Frame) -> Option<DeviceInfo>;

    /// Build the identity from reply text.
    fn build_device_info(&self, text: &str) -> DeviceInfo;

    /// Application version request, when the family has one.
    fn version_command(&self) -> Option<Command>;

    /// Parse the reply to [`version_command`](Self::version_command).
    fn parse_app_info(&self, frame: &Frame) -> Result<AppInfo>;

    /// Application info for families whose identity reply carries it.
    fn app_info_from_identity(&self, info: &DeviceInfo) -> Option<AppInfo>;

    /// Schema for this family, preferring `<dir>/<name>.json`.
    fn load_schema(&self, dir: Option<&Path>) -> std::result::Result<DeviceSchema, SchemaError>;

    /// Bootloader command set, `None` when the family cannot be upgraded.
    fn bootloader(&self) -> Option<BootloaderCommandSet>;

    /// Workers that upgrade this family with `image`.
    fn get_upgrade_workers(
        &self,
        link: Arc<dyn UpgradeLink>,
        image: &[u8],
        config: &UpgradeConfig,
    ) -> std::result::Result<Vec<Box<dyn UpgradeWorker>>, UpgradeError>;
}

impl DeviceProtocol for DeviceDialect {
    fn wire_format(&self, host_mac: Option<MacAddress>) -> WireFormat {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::Dmu => WireFormat::uart(),
            DeviceDialect::OpenRtk => WireFormat::UartWithNmea {
                resync: Default::default(),
            },
            DeviceDialect::Ins2000 => WireFormat::AsciiLine,
            DeviceDialect::Ins401 => {
                WireFormat::Ethernet(EthernetConfig::new(host_mac.unwrap_or_default()))
            }
        }
    }

    fn ping_command(&self) -> Command {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => Command::packet(PING, Vec::new()),
            DeviceDialect::Dmu => Command::packet(DMU_GET_PACKET, b"ID".to_vec())
                .expecting(ResponseMatcher::Type(DMU_ID)),
            DeviceDialect::Ins2000 => Command::text(INS2000_VERSION_COMMAND)
                .expecting(ResponseMatcher::TextContains(INS2000_MARKER.to_string())),
            DeviceDialect::Ins401 => Command::packet(ETH_PING, Vec::new()),
        }
    }

    fn ping(&self, frame: &Frame) -> Option<DeviceInfo> {
        match (self, frame) {
            (DeviceDialect::Dmu, Frame::Packet(p)) if p.packet_type == DMU_ID => {
                let serial = p.payload.get(..4)?;
                let serial = u32::from_be_bytes([serial[0], serial[1], serial[2], serial[3]]);
                let model = String::from_utf8_lossy(&p.payload[4..]);
                let model = model.trim_matches(char::from(0)).trim();
                Some(self.build_device_info(model).with_serial_number(serial.to_string()))
            }
            (DeviceDialect::Dmu, _) => None,
            (DeviceDialect::Ins2000, Frame::Text(text)) if text.contains(self.marker()) => {
                Some(self.build_device_info(text))
            }
            (DeviceDialect::Ins2000, _) => None,
            (_, Frame::Packet(p)) if self.ping_command().expect.matches(frame) => {
                let text = p.payload_text();
                text.contains(self.marker())
                    .then(|| self.build_device_info(&text))
            }
            _ => None,
        }
    }

    fn build_device_info(&self, text: &str) -> DeviceInfo {
        DeviceInfo::parse(*self, text)
    }

    fn version_command(&self) -> Option<Command> {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk => {
                Some(Command::packet(GET_VERSION, Vec::new()))
            }
            DeviceDialect::Dmu => Some(
                Command::packet(DMU_GET_PACKET, b"VR".to_vec())
                    .expecting(ResponseMatcher::Type(DMU_VERSION)),
            ),
            DeviceDialect::Ins2000 | DeviceDialect::Ins401 => None,
        }
    }

    fn parse_app_info(&self, frame: &Frame) -> Result<AppInfo> {
        match (self, frame) {
            (DeviceDialect::Dmu, Frame::Packet(p)) => {
                let v = p.payload.get(..5).ok_or_else(|| {
                    DriverError::unexpected("VR", format!("{} byte version", p.payload.len()))
                })?;
                Ok(AppInfo {
                    app_name: "DMU".to_string(),
                    version: Some(format!("{}.{}.{}.{}.{}", v[0], v[1], v[2], v[3], v[4])),
                    raw: hex::encode(&p.payload),
                })
            }
            _ => Ok(AppInfo::parse(&frame.text())),
        }
    }

    fn app_info_from_identity(&self, info: &DeviceInfo) -> Option<AppInfo> {
        match self {
            DeviceDialect::Ins2000 | DeviceDialect::Ins401 => Some(AppInfo::parse(&info.raw)),
            _ => None,
        }
    }

    fn load_schema(&self, dir: Option<&Path>) -> std::result::Result<DeviceSchema, SchemaError> {
        DeviceSchema::resolve(dir, self.name())
    }

    fn bootloader(&self) -> Option<BootloaderCommandSet> {
        match self {
            DeviceDialect::OpenImu | DeviceDialect::OpenRtk | DeviceDialect::Dmu => {
                Some(BootloaderCommandSet::UART)
            }
            DeviceDialect::Ins401 => Some(BootloaderCommandSet::ETHERNET),
            DeviceDialect::Ins2000 => None,
        }
    }

    fn get_upgrade_workers(
        &self,
        link: Arc<dyn UpgradeLink>,
        image: &[u8],
        config: &UpgradeConfig,
    ) -> std::result::Result<Vec<Box<dyn UpgradeWorker>>, UpgradeError> {
        let commands = self
            .bootloader()
            .ok_or_else(|| UpgradeError::Unsupported(self.name().to_string()))?;
        let image = FirmwareImage::parse(image)?;
        let chain = |prefix: &str, group: WorkerGroup, selector: &[u8], data: &[u8], confirm: bool| {
            upgrade_chain(
                *self, &link, commands, config, prefix, group, selector, data, confirm,
            )
        };

        if !image.is_combined() {
            let data = image.section(SectionKind::Whole).unwrap_or_default();
            return Ok(chain("firmware", WorkerGroup::named("firmware"), &[], data, true));
        }
        if *self != DeviceDialect::OpenRtk {
            return Err(UpgradeError::Image(format!(
                "{} takes a single application image, not a combined one",
                self.name()
            )));
        }
        if image.section(SectionKind::Sdk).is_some() {
            tracing::warn!("skipping sdk section: the GNSS chip is not upgraded over this link");
        }

        let rtk = image.section(SectionKind::Rtk);
        let imu = image.section(SectionKind::Imu);
        let mut workers = Vec::new();
        if let Some(data) = rtk {
            workers.extend(chain("rtk", WorkerGroup::BeforeAll, &[], data, imu.is_none()));
        }
        if let Some(data) = imu {
            workers.extend(chain(
                "imu",
                WorkerGroup::named("imu"),
                &[IMU_CORE_SELECTOR],
                data,
                true,
            ));
        }
        if workers.is_empty() {
            return Err(UpgradeError::Image("no upgradable section found".into()));
        }
        Ok(workers)
    }
}

/// Jump to bootloader, write, jump back: the three workers of one upgrade stage.
#[allow(clippy::too_many_arguments)]
fn upgrade_chain(
    dialect: DeviceDialect,
    link: &Arc<dyn UpgradeLink>,
    commands: BootloaderCommandSet,
    config: &UpgradeConfig,
    prefix: &str,
    group: WorkerGroup,
    selector: &[u8],
    data: &[u8],
    confirm: bool,
) -> Vec<Box<dyn UpgradeWorker>> {
    let jump_back = JumpApplicationWorker::new(
        format!("{prefix}-jump-application"),
        Arc::clone(link),
        commands,
        config,
    )
    .in_group(group.clone());
    let jump_back = if confirm {
        jump_back.confirming(dialect)
    } else {
        jump_back
    };
    vec![
        Box::new(
            JumpBootloaderWorker::new(
                format!("{prefix}-jump-bootloader"),
                Arc::clone(link),
                commands,
                config,
            )
            .with_selector(selector)
            .in_group(group.clone()),
        ),
        Box::new(
            FirmwareWriteWorker::new(
                format!("{prefix}-write"),
                Arc::clone(link),
                commands,
                data.to_vec(),
                config,
            )
            .in_group(group),
        ),
        Box::new(jump_back),
    ]
}

/// One identity request shared by several families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeStep {
    pub format: WireFormat,
    pub command: Command,
    /// Families to classify the reply against, in order.
    pub dialects: Vec<DeviceDialect>,
}

impl ProbeStep {
    /// The first family recognising `frame`.
    pub fn classify(&self, frame: &Frame) -> Option<DeviceInfo> {
        self.dialects.iter().find_map(|d| d.ping(frame))
    }
}

/// Group families that share an identity request, so each request is sent
/// once per port and baud rate.
pub fn probe_plan(dialects: &[DeviceDialect]) -> Vec<ProbeStep> {
    let mut plan: Vec<ProbeStep> = Vec::new();
    for &dialect in dialects {
        let format = dialect.probe_format(None);
        let command = dialect.ping_command();
        match plan
            .iter_mut()
            .find(|s| s.format == format && s.command == command)
        {
            Some(step) => step.dialects.push(dialect),
            None => plan.push(ProbeStep {
                format,
                command,
                dialects: vec![dialect],
            }),
        }
    }
    plan
}
