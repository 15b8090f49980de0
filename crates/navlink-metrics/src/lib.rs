//! Metric declarations for the navlink driver.
//!
//! Every metric the driver records is declared once as a [`Metric`] constant
//! in [`metric_defs`], so names cannot drift between call sites. Recording
//! goes through the `metrics` facade and costs nothing until the binary
//! installs a recorder.
//!
//! ```rust,ignore
//! use navlink_metrics::{metric_defs, MetricLabels};
//!
//! let labels = MetricLabels::new("/dev/ttyUSB0", "openimu");
//! metrics::counter!(metric_defs::FRAMES_DECODED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge, or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric name with its kind, description, unit, and label keys.
///
/// ```rust
/// use navlink_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("navlink.example.retries")
///     .with_description("Retried writes")
///     .with_unit(Unit::Count)
///     .with_labels(&["port"]);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys call sites are expected to attach.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// Every metric the driver records.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels carried by everything recorded against an open link.
    pub const LINK_LABELS: &[&str] = &["port", "device_type"];

    // ========================================================================
    // Framing
    // ========================================================================

    pub const FRAMES_DECODED: Metric = Metric::counter("navlink.frames.decoded")
        .with_description("Frames that passed checksum validation")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    pub const FRAMES_CRC_ERRORS: Metric = Metric::counter("navlink.frames.crc_errors")
        .with_description("Frames discarded on checksum mismatch")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Transactions
    // ========================================================================

    pub const TRANSACTIONS_COMPLETED: Metric = Metric::counter("navlink.transactions.completed")
        .with_description("Request/response exchanges that received a reply")
        .with_unit(Unit::Count)
        .with_labels(&["port", "device_type", "packet_type"]);

    pub const TRANSACTIONS_TIMEOUTS: Metric = Metric::counter("navlink.transactions.timeouts")
        .with_description("Request/response exchanges that ran past their deadline")
        .with_unit(Unit::Count)
        .with_labels(&["port", "device_type", "packet_type"]);

    /// Time from writing a command to matching its reply.
    pub const TRANSACTION_LATENCY: Metric = Metric::histogram("navlink.transactions.latency_ms")
        .with_description("Command round trip time")
        .with_unit(Unit::Milliseconds)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Transport
    // ========================================================================

    pub const TRANSPORT_BYTES_READ: Metric = Metric::counter("navlink.transport.bytes_read")
        .with_description("Bytes received from the transport")
        .with_unit(Unit::Bytes)
        .with_labels(LINK_LABELS);

    pub const TRANSPORT_BYTES_WRITTEN: Metric = Metric::counter("navlink.transport.bytes_written")
        .with_description("Bytes written to the transport")
        .with_unit(Unit::Bytes)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Discovery and upgrade
    // ========================================================================

    pub const PROBE_ATTEMPTS: Metric = Metric::counter("navlink.discovery.probe_attempts")
        .with_description("Port and baud rate combinations probed")
        .with_unit(Unit::Count)
        .with_labels(&["port"]);

    pub const UPGRADE_BYTES_WRITTEN: Metric = Metric::counter("navlink.upgrade.bytes_written")
        .with_description("Firmware bytes acknowledged by the bootloader")
        .with_unit(Unit::Bytes)
        .with_labels(&["worker"]);

    pub const ALL: &[&Metric] = &[
        &FRAMES_DECODED,
        &FRAMES_CRC_ERRORS,
        &TRANSACTIONS_COMPLETED,
        &TRANSACTIONS_TIMEOUTS,
        &TRANSACTION_LATENCY,
        &TRANSPORT_BYTES_READ,
        &TRANSPORT_BYTES_WRITTEN,
        &PROBE_ATTEMPTS,
        &UPGRADE_BYTES_WRITTEN,
    ];
}

/// Labels identifying one device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Port or interface name.
    pub port: String,
    /// Dialect tag, empty while unknown.
    pub device_type: String,
}

impl MetricLabels {
    pub fn new(port: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            device_type: device_type.into(),
        }
    }

    /// Label pairs in the form the `metrics` macros accept.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("port", self.port.clone()),
            ("device_type", self.device_type.clone()),
        ]
    }

    /// [`to_labels`](Self::to_labels) plus extra pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describe every metric in [`metric_defs::ALL`]. Call after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
