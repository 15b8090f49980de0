//! Named session commands.
//!
//! Each schema lists the commands its application exposes. Names are
//! resolved against a fixed table of [`SessionCommand`]s when the schema is
//! loaded; anything else is rejected with [`DriverError::UnknownCommand`].

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crossbeam_channel::Receiver;
use navlink_schema::{DeviceSchema, ParamValue};

use crate::error::{DriverError, Result};
use crate::params::ParamReading;
use crate::session::DeviceSession;
use crate::telemetry::{JsonLinesSink, TelemetryRecord, TelemetrySink, TracingSink};
use crate::upgrade::UpgradeEvent;

/// Everything a session can be asked to do by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCommand {
    Help,
    Info,
    GetParams,
    GetParam,
    SetParam,
    SaveConfig,
    RestoreDefaults,
    StartStream,
    StopStream,
    StartLog,
    StopLog,
    Upgrade,
}

const KNOWN: [(&str, SessionCommand); 12] = [
    ("help", SessionCommand::Help),
    ("info", SessionCommand::Info),
    ("getParams", SessionCommand::GetParams),
    ("getParam", SessionCommand::GetParam),
    ("setParam", SessionCommand::SetParam),
    ("saveConfig", SessionCommand::SaveConfig),
    ("restoreDefaults", SessionCommand::RestoreDefaults),
    ("startStream", SessionCommand::StartStream),
    ("stopStream", SessionCommand::StopStream),
    ("startLog", SessionCommand::StartLog),
    ("stopLog", SessionCommand::StopLog),
    ("upgrade", SessionCommand::Upgrade),
];

impl SessionCommand {
    /// Look up a command by its schema name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        KNOWN
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, c)| *c)
    }

    pub fn name(&self) -> &'static str {
        KNOWN
            .iter()
            .find(|(_, c)| c == self)
            .map_or("?", |(n, _)| *n)
    }

    pub fn usage(&self) -> &'static str {
        match self {
            SessionCommand::GetParam => "getParam <name>",
            SessionCommand::SetParam => "setParam <name> <value>",
            SessionCommand::StartLog => "startLog [file.jsonl]",
            SessionCommand::Upgrade => "upgrade <firmware.bin>",
            _ => self.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    command: SessionCommand,
    description: String,
}

/// Commands available for one schema.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: Vec<Entry>,
}

impl CommandTable {
    /// Build the table from the schema's command list. `help` is always
    /// present; names without a handler are skipped.
    pub fn from_schema(schema: &DeviceSchema) -> Self {
        let mut table = CommandTable::default();
        for def in schema.cli_commands() {
            let Some(command) = SessionCommand::from_name(&def.name) else {
                tracing::warn!("schema '{}' lists unsupported command '{}'", schema.name(), def.name);
                continue;
            };
            table.insert(&def.name, command, def.description.as_deref().unwrap_or_default());
        }
        if table.entries.iter().all(|e| e.command != SessionCommand::Help) {
            table.insert("help", SessionCommand::Help, "List commands");
        }
        table
    }

    fn insert(&mut self, name: &str, command: SessionCommand, description: &str) {
        if self.entries.iter().any(|e| e.command == command) {
            return;
        }
        self.entries.push(Entry {
            name: name.to_string(),
            command,
            description: description.to_string(),
        });
    }

    pub fn resolve(&self, name: &str) -> Result<SessionCommand> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
            .map(|e| e.command)
            .ok_or_else(|| DriverError::UnknownCommand(name.trim().to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn help_text(&self) -> String {
        let width = self
            .entries
            .iter()
            .map(|e| e.command.usage().len())
            .max()
            .unwrap_or(0);
        self.entries
            .iter()
            .map(|e| format!("  {:width$}  {}", e.command.usage(), e.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of [`run_command`].
#[derive(Debug)]
pub enum CommandOutput {
    Text(String),
    Params(Vec<ParamReading>),
    /// Telemetry subscription; drop it or run `stopStream` to end.
    Stream(Receiver<TelemetryRecord>),
    Done,
}

fn arg<'a>(command: SessionCommand, args: &'a [String], index: usize) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| DriverError::Usage(command.usage().to_string()))
}

/// Execute `command` against `session`.
pub fn run_command(
    session: &DeviceSession,
    table: &CommandTable,
    command: SessionCommand,
    args: &[String],
) -> Result<CommandOutput> {
    tracing::debug!("running {} {:?}", command.name(), args);
    let output = match command {
        SessionCommand::Help => CommandOutput::Text(table.help_text()),
        SessionCommand::Info => {
            let mut text = session.device_info().to_string();
            if let Some(app) = session.app_info() {
                text.push_str(&format!("\napplication: {app}"));
            }
            text.push_str(&format!("\nstate: {}", session.state()));
            CommandOutput::Text(text)
        }
        SessionCommand::GetParams => CommandOutput::Params(session.get_params()?),
        SessionCommand::GetParam => {
            CommandOutput::Params(vec![session.get_param(arg(command, args, 0)?)?])
        }
        SessionCommand::SetParam => {
            let name = arg(command, args, 0)?;
            let value = ParamValue::parse_loose(arg(command, args, 1)?);
            session.set_param(name, value)?;
            CommandOutput::Done
        }
        SessionCommand::SaveConfig => {
            session.save_config()?;
            CommandOutput::Done
        }
        SessionCommand::RestoreDefaults => {
            session.restore_defaults()?;
            CommandOutput::Done
        }
        SessionCommand::StartStream => CommandOutput::Stream(session.start_stream()?),
        SessionCommand::StopStream => {
            session.stop_stream()?;
            CommandOutput::Done
        }
        SessionCommand::StartLog => {
            let sink: Box<dyn TelemetrySink> = match args.first() {
                Some(path) => {
                    let file = File::create(path).map_err(|e| DriverError::io(path, e))?;
                    Box::new(JsonLinesSink::new(BufWriter::new(file), path.as_str()))
                }
                None => Box::new(TracingSink),
            };
            session.start_logging(sink)?;
            CommandOutput::Done
        }
        SessionCommand::StopLog => {
            session.stop_logging()?;
            CommandOutput::Done
        }
        SessionCommand::Upgrade => {
            let path = Path::new(arg(command, args, 0)?);
            let image = std::fs::read(path).map_err(|e| DriverError::io(path, e))?;
            session.upgrade(&image, log_upgrade_event)?;
            CommandOutput::Done
        }
    };
    Ok(output)
}

fn log_upgrade_event(event: &UpgradeEvent) {
    match event {
        UpgradeEvent::Progress { current, total } => {
            tracing::info!("upgrade {}/{} bytes", current, total);
        }
        UpgradeEvent::WorkerFinished { worker } => tracing::info!("{} done", worker),
        UpgradeEvent::Error { worker, message } => tracing::error!("{}: {}", worker, message),
        UpgradeEvent::Finished => tracing::info!("upgrade complete"),
        UpgradeEvent::WorkerProgress { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_follows_schema() {
        let schema = DeviceSchema::builtin("openimu").unwrap();
        let table = CommandTable::from_schema(&schema);
        assert_eq!(table.resolve("getParams").unwrap(), SessionCommand::GetParams);
        assert_eq!(table.resolve("SETPARAM").unwrap(), SessionCommand::SetParam);
        assert!(table.names().contains(&"upgrade"));
        assert!(matches!(
            table.resolve("selfDestruct"),
            Err(DriverError::UnknownCommand(name)) if name == "selfDestruct"
        ));
    }

    #[test]
    fn test_help_is_always_available() {
        let schema = DeviceSchema::builtin("ins2000").unwrap();
        let table = CommandTable::from_schema(&schema);
        assert_eq!(table.resolve("help").unwrap(), SessionCommand::Help);
        assert!(table.help_text().contains("help"));
    }

    #[test]
    fn test_names_round_trip() {
        for (name, command) in KNOWN {
            assert_eq!(SessionCommand::from_name(name), Some(command));
            assert_eq!(command.name(), name);
        }
        assert_eq!(SessionCommand::SetParam.usage(), "setParam <name> <value>");
    }
}
