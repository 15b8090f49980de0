//! Continuous output decoding and sinks.

use std::io::Write;

use chrono::{DateTime, Utc};
use navlink_protocol::{Frame, NmeaSentence};
use navlink_schema::{DeviceSchema, ParamValue};
use serde::Serialize;

use crate::error::{DriverError, Result};

/// One decoded field of a telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryField {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub value: ParamValue,
}

impl TelemetryField {
    fn new(name: &str, unit: Option<&str>, value: ParamValue) -> Self {
        TelemetryField {
            name: name.to_string(),
            unit: unit.map(str::to_string),
            value,
        }
    }
}

/// A continuous packet decoded by its output layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    /// Packet type or NMEA sentence kind.
    pub packet: String,
    pub fields: Vec<TelemetryField>,
}

impl TelemetryRecord {
    /// Decode `frame`, or `None` when the schema does not describe it.
    ///
    /// NaN floats surface as `0`.
    pub fn decode(schema: &DeviceSchema, frame: &Frame) -> Result<Option<Self>> {
        let (packet, fields) = match frame {
            Frame::Packet(p) => {
                let Ok(def) = schema.output_packet(p.packet_type) else {
                    return Ok(None);
                };
                let fields = def
                    .layout
                    .decode(&schema.codec(), &p.payload)?
                    .into_iter()
                    .map(|f| TelemetryField {
                        value: ParamValue::from_field(&f.value),
                        name: f.name,
                        unit: f.unit,
                    })
                    .collect();
                (def.name.clone(), fields)
            }
            Frame::Nmea(sentence) => match nmea_fields(sentence)? {
                Some(fields) => (sentence.kind.clone(), fields),
                None => return Ok(None),
            },
            Frame::Text(_) => return Ok(None),
        };
        Ok(Some(TelemetryRecord {
            timestamp: Utc::now(),
            packet,
            fields,
        }))
    }

    pub fn field(&self, name: &str) -> Option<&ParamValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

fn opt<T: Into<ParamValue>>(value: Option<T>) -> ParamValue {
    value.map(Into::into).unwrap_or(ParamValue::Float(0.0))
}

fn nmea_fields(sentence: &NmeaSentence) -> Result<Option<Vec<TelemetryField>>> {
    let fields = match sentence.kind.as_str() {
        "GGA" => {
            let fix = sentence.to_gga()?;
            vec![
                TelemetryField::new("utc_time", None, fix.utc_time.into()),
                TelemetryField::new("latitude", Some("deg"), opt(fix.latitude)),
                TelemetryField::new("longitude", Some("deg"), opt(fix.longitude)),
                TelemetryField::new("altitude", Some("m"), opt(fix.altitude_m)),
                TelemetryField::new("quality", None, ParamValue::Integer(fix.quality.into())),
                TelemetryField::new("satellites", None, ParamValue::Integer(fix.satellites.into())),
                TelemetryField::new("hdop", None, opt(fix.hdop.map(f64::from))),
            ]
        }
        "GSV" => {
            let report = sentence.to_gsv()?;
            let mut fields = vec![TelemetryField::new(
                "satellites_in_view",
                None,
                ParamValue::Integer(report.satellites_in_view.into()),
            )];
            for sat in &report.satellites {
                let snr = sat.snr.map_or(0, i64::from);
                fields.push(TelemetryField::new(
                    &format!("snr_{}", sat.prn),
                    Some("dB-Hz"),
                    ParamValue::Integer(snr),
                ));
            }
            fields
        }
        _ => return Ok(None),
    };
    Ok(Some(fields))
}

/// Receives records while a session is logging.
pub trait TelemetrySink: Send {
    fn write(&mut self, record: &TelemetryRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Logs each record at debug level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn write(&mut self, record: &TelemetryRecord) -> Result<()> {
        let values: Vec<String> = record
            .fields
            .iter()
            .map(|f| format!("{}={}", f.name, f.value))
            .collect();
        tracing::debug!(packet = %record.packet, "{}", values.join(" "));
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
    label: String,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// `label` names the destination in error messages.
    pub fn new(out: W, label: impl Into<String>) -> Self {
        JsonLinesSink {
            out,
            label: label.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TelemetrySink for JsonLinesSink<W> {
    fn write(&mut self, record: &TelemetryRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out
            .write_all(b"\n")
            .map_err(|e| DriverError::io(&self.label, e))
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| DriverError::io(&self.label, e))
    }
}
