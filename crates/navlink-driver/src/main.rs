//! `navlink` command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use navlink_driver::{
    detect_on, run_command, AppContext, CommandOutput, CommandTable, DeviceDialect,
    DeviceIdentifier, DeviceSession, DiscoveredDevice, DriverConfig, DriverError, JsonLinesSink,
    ParamReading, Result, SessionCommand,
};
use navlink_schema::ParamValue;
use navlink_transport::{SystemPorts, TcpTransport};
use tracing_subscriber::EnvFilter;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_SLICE: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "navlink")]
#[command(version, about = "Talk to OpenIMU, OpenRTK, DMU and INS navigation devices")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Only probe this serial port
    #[arg(short, long)]
    port: Option<String>,

    /// Connect to a serial-over-TCP bridge instead of probing serial ports
    #[arg(long, conflicts_with = "port")]
    tcp: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Find a device and print its identity
    Detect,
    /// Print device and application information
    Info,
    /// Read parameters (all of them when no name is given)
    Get { names: Vec<String> },
    /// Write one parameter
    Set { name: String, value: String },
    /// Persist the working configuration
    Save,
    /// Restore factory defaults
    Restore,
    /// Print telemetry as JSON lines until interrupted
    Stream {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after this many records
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Write a firmware image
    Upgrade { file: PathBuf },
    /// Run a command from the device's command table
    Exec { name: String, args: Vec<String> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    navlink_metrics::describe_metrics();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(DriverError::Cancelled) => {
            tracing::warn!("interrupted");
            ExitCode::from(130)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    let ctx = AppContext::new(config);
    let flag = ctx.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!("cannot install Ctrl-C handler: {}", e);
    }

    let device = connect(&ctx, &cli)?;
    if let Cmd::Detect = cli.command {
        println!("{}", device.device_info);
        match device.baud {
            Some(baud) => println!("port: {}@{}", device.port, baud),
            None => println!("port: {}", device.port),
        }
        return Ok(());
    }

    let session = DeviceSession::open(&ctx, device)?;
    let table = CommandTable::from_schema(session.schema());
    let result = execute(&ctx, &session, &table, cli.command);
    session.close();
    result
}

fn connect(ctx: &AppContext, cli: &Cli) -> Result<DiscoveredDevice> {
    let discovery = &ctx.config.discovery;
    if let Some(address) = &cli.tcp {
        let transport = TcpTransport::connect(address, TCP_CONNECT_TIMEOUT, discovery.read_poll())?;
        return detect_on(
            Box::new(transport),
            &DeviceDialect::SERIAL,
            discovery.probe_timeout(),
            None,
        );
    }
    let ports = Arc::new(SystemPorts::new(discovery.read_poll()));
    let mut identifier = DeviceIdentifier::new(ctx, ports);
    if let Some(port) = &cli.port {
        identifier = identifier.with_ports(std::slice::from_ref(port));
    }
    identifier.detect()
}

fn execute(ctx: &AppContext, session: &DeviceSession, table: &CommandTable, command: Cmd) -> Result<()> {
    let (command, args) = match command {
        Cmd::Detect => return Ok(()),
        Cmd::Info => (SessionCommand::Info, vec![]),
        Cmd::Get { names } if names.is_empty() => (SessionCommand::GetParams, vec![]),
        Cmd::Get { names } => {
            let mut readings = Vec::with_capacity(names.len());
            for name in &names {
                readings.push(session.get_param(name)?);
            }
            print_params(&readings);
            return Ok(());
        }
        Cmd::Set { name, value } => {
            session.set_param(&name, ParamValue::parse_loose(&value))?;
            println!("{name} = {value}");
            return Ok(());
        }
        Cmd::Save => (SessionCommand::SaveConfig, vec![]),
        Cmd::Restore => (SessionCommand::RestoreDefaults, vec![]),
        Cmd::Stream { output: Some(path), .. } => {
            let file = std::fs::File::create(&path).map_err(|e| DriverError::io(&path, e))?;
            let label = path.display().to_string();
            session.start_logging(Box::new(JsonLinesSink::new(std::io::BufWriter::new(file), label)))?;
            tracing::info!("logging to {}, Ctrl-C to stop", path.display());
            while !ctx.is_cancelled() && session.state() == navlink_driver::SessionState::Logging {
                std::thread::sleep(WAIT_SLICE);
            }
            session.stop_logging()?;
            return Ok(());
        }
        Cmd::Stream { output: None, count } => {
            let rx = session.start_stream()?;
            let mut seen = 0usize;
            while !ctx.is_cancelled() && count.map_or(true, |n| seen < n) {
                match rx.recv_timeout(WAIT_SLICE) {
                    Ok(record) => {
                        println!("{}", serde_json::to_string(&record)?);
                        seen += 1;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            session.stop_stream()?;
            return Ok(());
        }
        Cmd::Upgrade { file } => (SessionCommand::Upgrade, vec![file.display().to_string()]),
        Cmd::Exec { name, args } => (table.resolve(&name)?, args),
    };

    match run_command(session, table, command, &args)? {
        CommandOutput::Text(text) => println!("{text}"),
        CommandOutput::Params(readings) => print_params(&readings),
        CommandOutput::Stream(rx) => {
            while !ctx.is_cancelled() {
                match rx.recv_timeout(WAIT_SLICE) {
                    Ok(record) => println!("{}", serde_json::to_string(&record)?),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            session.stop_stream()?;
        }
        CommandOutput::Done => println!("ok"),
    }
    if ctx.is_cancelled() {
        return Err(DriverError::Cancelled);
    }
    Ok(())
}

fn print_params(readings: &[ParamReading]) {
    let width = readings.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for reading in readings {
        println!("{:>4}  {:width$}  {}", reading.id, reading.name, reading.value);
    }
}
