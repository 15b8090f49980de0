//! Navlink host driver
//!
//! Discovers serial, TCP and Ethernet attached navigation devices, correlates
//! requests with replies over a single-flight [`MessageCenter`], and exposes
//! parameter access, telemetry streaming and firmware upgrade through a
//! [`DeviceSession`].
//!
//! ```rust,ignore
//! use navlink_driver::{AppContext, DeviceIdentifier, DeviceSession};
//! use navlink_transport::SystemPorts;
//!
//! let ctx = AppContext::default();
//! let ports = Arc::new(SystemPorts::new(ctx.config.discovery.read_poll()));
//! let device = DeviceIdentifier::new(&ctx, ports).detect()?;
//! let session = DeviceSession::open(&ctx, device)?;
//! println!("{:?}", session.get_param("baud_rate")?);
//! ```

pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod device_info;
pub mod dialect;
pub mod error;
pub mod identifier;
pub mod message_center;
pub mod params;
pub mod persist;
pub mod session;
pub mod telemetry;
pub mod upgrade;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{run_command, CommandOutput, CommandTable, SessionCommand};
pub use config::{DiscoveryConfig, DriverConfig, TransactionConfig, UpgradeConfig};
pub use context::AppContext;
pub use device_info::{AppInfo, DeviceInfo};
pub use dialect::{probe_plan, DeviceDialect, DeviceProtocol, ProbeStep};
pub use error::{DriverError, Result, TransactionError, UpgradeError};
pub use identifier::{detect_on, DeviceIdentifier, DiscoveredDevice};
pub use message_center::{
    MessageCenter, MessageCenterEvent, MessageCenterOptions, PendingResponse, Reply,
};
pub use params::{GetParamsSequence, ParamReading};
pub use persist::{LastConnection, LastConnectionStore};
pub use session::{DeviceSession, SessionState};
pub use telemetry::{JsonLinesSink, TelemetryField, TelemetryRecord, TelemetrySink, TracingSink};
pub use upgrade::{UpgradeCenter, UpgradeEvent, UpgradeWorker, WorkerGroup};
