//! NMEA 0183 sentences.
//!
//! `$<talker><kind>,<field>,...*<XOR checksum hex>\r\n`. The checksum is the
//! XOR of every byte between `$` and `*`. Only GGA and GSV get typed
//! accessors; any other sentence is carried as raw fields.

use std::fmt;

use crate::constants::MAX_NMEA_LENGTH;
use crate::error::ProtocolError;
use crate::frame::{DecodeEvent, DecoderStats, FrameDecoder};
use crate::packet::Frame;

/// A checksum-validated NMEA sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmeaSentence {
    /// Talker identifier (`GP`, `GN`, ...). `P` for proprietary sentences.
    pub talker: String,
    /// Sentence formatter (`GGA`, `GSV`, ...).
    pub kind: String,
    /// Comma separated data fields after the address.
    pub fields: Vec<String>,
}

impl NmeaSentence {
    /// Build a sentence from parts.
    pub fn new(talker: impl Into<String>, kind: impl Into<String>, fields: Vec<String>) -> Self {
        NmeaSentence {
            talker: talker.into(),
            kind: kind.into(),
            fields,
        }
    }

    /// XOR checksum over the text between `$` and `*`.
    pub fn checksum(body: &str) -> u8 {
        body.bytes().fold(0u8, |acc, b| acc ^ b)
    }

    /// Parse one sentence. Surrounding whitespace and the line terminator are
    /// ignored. A checksum mismatch is reported as `CrcMismatch`.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let rest = line
            .strip_prefix('$')
            .ok_or_else(|| ProtocolError::InvalidSentence(format!("missing '$': {line}")))?;
        let (body, carried) = rest
            .rsplit_once('*')
            .ok_or_else(|| ProtocolError::InvalidSentence(format!("missing checksum: {line}")))?;
        let carried = u8::from_str_radix(carried, 16)
            .map_err(|_| ProtocolError::InvalidSentence(format!("bad checksum digits: {line}")))?;
        let computed = Self::checksum(body);
        if carried != computed {
            return Err(ProtocolError::CrcMismatch {
                expected: carried as u32,
                actual: computed as u32,
            });
        }

        let mut parts = body.split(',');
        let address = parts.next().unwrap_or_default();
        if address.len() < 3 || !address.is_ascii() {
            return Err(ProtocolError::InvalidSentence(format!("bad address: {line}")));
        }
        let split = if address.starts_with('P') { 1 } else { 2 };
        let (talker, kind) = address.split_at(split);

        Ok(NmeaSentence {
            talker: talker.to_string(),
            kind: kind.to_string(),
            fields: parts.map(str::to_string).collect(),
        })
    }

    /// Text between `$` and `*`.
    pub fn body(&self) -> String {
        let mut body = format!("{}{}", self.talker, self.kind);
        for field in &self.fields {
            body.push(',');
            body.push_str(field);
        }
        body
    }

    /// Full sentence with checksum and `\r\n`.
    pub fn encode(&self) -> String {
        let body = self.body();
        format!("${}*{:02X}\r\n", body, Self::checksum(&body))
    }

    /// Field by index, `None` when absent or empty.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Typed view of a GGA sentence.
    pub fn to_gga(&self) -> Result<GgaFix, ProtocolError> {
        if self.kind != "GGA" {
            return Err(ProtocolError::InvalidSentence(format!("{} is not GGA", self.kind)));
        }
        Ok(GgaFix {
            utc_time: self.field(0).unwrap_or_default().to_string(),
            latitude: parse_coordinate(self.field(1), self.field(2), 'S')?,
            longitude: parse_coordinate(self.field(3), self.field(4), 'W')?,
            quality: parse_or(self.field(5), 0)?,
            satellites: parse_or(self.field(6), 0)?,
            hdop: parse_opt(self.field(7))?,
            altitude_m: parse_opt(self.field(8))?,
        })
    }

    /// Typed view of a GSV sentence.
    pub fn to_gsv(&self) -> Result<GsvReport, ProtocolError> {
        if self.kind != "GSV" {
            return Err(ProtocolError::InvalidSentence(format!("{} is not GSV", self.kind)));
        }
        let mut satellites = Vec::new();
        // NMEA 4.1 appends a signal id after the last block; chunks_exact drops it.
        for block in self.fields.get(3..).unwrap_or_default().chunks_exact(4) {
            let value = |i: usize| Some(block[i].as_str()).filter(|s| !s.is_empty());
            let Some(prn) = value(0) else { continue };
            satellites.push(SatelliteInView {
                prn: parse_or(Some(prn), 0)?,
                elevation: parse_opt(value(1))?,
                azimuth: parse_opt(value(2))?,
                snr: parse_opt(value(3))?,
            });
        }
        Ok(GsvReport {
            total_messages: parse_or(self.field(0), 0)?,
            message_number: parse_or(self.field(1), 0)?,
            satellites_in_view: parse_or(self.field(2), 0)?,
            satellites,
        })
    }
}

impl fmt::Display for NmeaSentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode().trim_end())
    }
}

fn parse_opt<T: std::str::FromStr>(text: Option<&str>) -> Result<Option<T>, ProtocolError> {
    text.map(|t| {
        t.parse()
            .map_err(|_| ProtocolError::InvalidSentence(format!("bad numeric field '{t}'")))
    })
    .transpose()
}

fn parse_or<T: std::str::FromStr>(text: Option<&str>, default: T) -> Result<T, ProtocolError> {
    Ok(parse_opt(text)?.unwrap_or(default))
}

/// `ddmm.mmmm` / `dddmm.mmmm` with hemisphere into signed decimal degrees.
fn parse_coordinate(
    value: Option<&str>,
    hemisphere: Option<&str>,
    negative: char,
) -> Result<Option<f64>, ProtocolError> {
    let Some(raw) = parse_opt::<f64>(value)? else {
        return Ok(None);
    };
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let mut decimal = degrees + minutes / 60.0;
    if hemisphere.and_then(|h| h.chars().next()) == Some(negative) {
        decimal = -decimal;
    }
    Ok(Some(decimal))
}

fn format_coordinate(value: f64, degree_digits: usize, positive: char, negative: char) -> (String, String) {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let value = value.abs();
    let degrees = value.trunc();
    let minutes = (value - degrees) * 60.0;
    (
        format!("{:0width$}{:07.4}", degrees as u32, minutes, width = degree_digits),
        hemisphere.to_string(),
    )
}

/// Position fix from a GGA sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct GgaFix {
    /// `hhmmss.ss` as sent.
    pub utc_time: String,
    /// Signed decimal degrees, north positive.
    pub latitude: Option<f64>,
    /// Signed decimal degrees, east positive.
    pub longitude: Option<f64>,
    /// Fix quality (0 invalid, 1 GPS, 4 RTK fixed, 5 RTK float, ...).
    pub quality: u8,
    /// Satellites used.
    pub satellites: u8,
    /// Horizontal dilution of precision.
    pub hdop: Option<f32>,
    /// Altitude above mean sea level in meters.
    pub altitude_m: Option<f64>,
}

impl GgaFix {
    /// Whether the receiver reports a usable position.
    pub fn has_fix(&self) -> bool {
        self.quality > 0 && self.latitude.is_some() && self.longitude.is_some()
    }

    /// Render as a GGA sentence (the form NTRIP casters expect).
    pub fn to_sentence(&self, talker: &str) -> NmeaSentence {
        let (lat, ns) = self
            .latitude
            .map(|v| format_coordinate(v, 2, 'N', 'S'))
            .unwrap_or_default();
        let (lon, ew) = self
            .longitude
            .map(|v| format_coordinate(v, 3, 'E', 'W'))
            .unwrap_or_default();
        let fields = vec![
            self.utc_time.clone(),
            lat,
            ns,
            lon,
            ew,
            self.quality.to_string(),
            format!("{:02}", self.satellites),
            self.hdop.map(|h| format!("{h:.1}")).unwrap_or_default(),
            self.altitude_m.map(|a| format!("{a:.1}")).unwrap_or_default(),
            "M".to_string(),
            String::new(),
            "M".to_string(),
            String::new(),
            String::new(),
        ];
        NmeaSentence::new(talker, "GGA", fields)
    }
}

/// One satellite block of a GSV sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatelliteInView {
    /// Satellite PRN number.
    pub prn: u16,
    /// Elevation in degrees.
    pub elevation: Option<u8>,
    /// Azimuth in degrees.
    pub azimuth: Option<u16>,
    /// Signal to noise ratio in dB-Hz, absent when not tracked.
    pub snr: Option<u8>,
}

/// Satellites-in-view report from one GSV sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsvReport {
    /// Sentences in this GSV cycle.
    pub total_messages: u8,
    /// Index of this sentence in the cycle, starting at 1.
    pub message_number: u8,
    /// Total satellites in view.
    pub satellites_in_view: u16,
    /// Satellite blocks carried by this sentence.
    pub satellites: Vec<SatelliteInView>,
}

/// Streaming decoder that picks NMEA sentences out of arbitrary bytes.
///
/// Bytes outside a `$ ... \n` span are ignored without being counted as
/// discarded, since the same stream usually carries binary packets too.
#[derive(Debug, Default)]
pub struct NmeaDecoder {
    buffer: Vec<u8>,
    in_sentence: bool,
    stats: DecoderStats,
}

impl NmeaDecoder {
    /// Create a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&mut self, out: &mut Vec<DecodeEvent>) {
        self.in_sentence = false;
        let Ok(line) = std::str::from_utf8(&self.buffer) else {
            self.stats.bytes_discarded += self.buffer.len() as u64;
            self.buffer.clear();
            return;
        };
        match NmeaSentence::parse(line) {
            Ok(sentence) => {
                log::trace!("nmea {}{}", sentence.talker, sentence.kind);
                self.stats.frames += 1;
                out.push(DecodeEvent::Frame(Frame::Nmea(sentence)));
            }
            Err(ProtocolError::CrcMismatch { expected, actual }) => {
                log::debug!("nmea checksum mismatch: {:?}", line.trim_end());
                self.stats.crc_errors += 1;
                out.push(DecodeEvent::CrcMismatch {
                    packet_type: None,
                    expected,
                    actual,
                });
            }
            Err(e) => {
                log::debug!("dropping nmea candidate: {}", e);
                self.stats.bytes_discarded += self.buffer.len() as u64;
            }
        }
        self.buffer.clear();
    }
}

impl FrameDecoder for NmeaDecoder {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<DecodeEvent>) {
        for &byte in chunk {
            if byte == b'$' {
                if self.in_sentence {
                    self.stats.bytes_discarded += self.buffer.len() as u64;
                }
                self.buffer.clear();
                self.in_sentence = true;
            }
            if !self.in_sentence {
                continue;
            }
            self.buffer.push(byte);
            if byte == b'\n' {
                self.finish(out);
            } else if self.buffer.len() > MAX_NMEA_LENGTH {
                log::warn!("nmea sentence exceeds {} bytes, dropping", MAX_NMEA_LENGTH);
                self.stats.bytes_discarded += self.buffer.len() as u64;
                self.buffer.clear();
                self.in_sentence = false;
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.in_sentence = false;
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const GSV: &str = "$GPGSV,2,1,08,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75";

    #[test]
    fn test_parse_gga() {
        let sentence = NmeaSentence::parse(GGA).unwrap();
        assert_eq!(sentence.talker, "GP");
        assert_eq!(sentence.kind, "GGA");

        let fix = sentence.to_gga().unwrap();
        assert_eq!(fix.utc_time, "123519");
        assert!((fix.latitude.unwrap() - 48.1173).abs() < 1e-4);
        assert!((fix.longitude.unwrap() - 11.516_666).abs() < 1e-4);
        assert_eq!(fix.quality, 1);
        assert_eq!(fix.satellites, 8);
        assert_eq!(fix.hdop, Some(0.9));
        assert_eq!(fix.altitude_m, Some(545.4));
        assert!(fix.has_fix());
    }

    #[test]
    fn test_parse_gsv() {
        let report = NmeaSentence::parse(GSV).unwrap().to_gsv().unwrap();
        assert_eq!(report.total_messages, 2);
        assert_eq!(report.message_number, 1);
        assert_eq!(report.satellites_in_view, 8);
        assert_eq!(report.satellites.len(), 4);
        assert_eq!(
            report.satellites[0],
            SatelliteInView {
                prn: 1,
                elevation: Some(40),
                azimuth: Some(83),
                snr: Some(46),
            }
        );
    }

    #[test]
    fn test_checksum_mismatch_is_reported() {
        let bad = GGA.replace("*47", "*48");
        assert!(matches!(
            NmeaSentence::parse(&bad),
            Err(ProtocolError::CrcMismatch { expected: 0x48, actual: 0x47 })
        ));
    }

    #[test]
    fn test_encode_reproduces_input() {
        let sentence = NmeaSentence::parse(GGA).unwrap();
        assert_eq!(sentence.encode(), format!("{GGA}\r\n"));
    }

    #[test]
    fn test_southern_western_hemispheres_are_negative() {
        let fix = GgaFix {
            utc_time: "000000".into(),
            latitude: Some(-33.8688),
            longitude: Some(-151.2093),
            quality: 4,
            satellites: 12,
            hdop: Some(0.7),
            altitude_m: Some(12.0),
        };
        let line = fix.to_sentence("GN").encode();
        let back = NmeaSentence::parse(&line).unwrap().to_gga().unwrap();
        assert!((back.latitude.unwrap() + 33.8688).abs() < 1e-4);
        assert!((back.longitude.unwrap() + 151.2093).abs() < 1e-4);
        assert_eq!(back.quality, 4);
    }

    #[test]
    fn test_decoder_skips_noise_and_reports_bad_checksums() {
        let mut decoder = NmeaDecoder::new();
        let mut out = Vec::new();
        let bad = GGA.replace("*47", "*00");
        let stream = format!("noise{GGA}\r\n{bad}\r\n");
        // Split mid-sentence to exercise buffering across chunks.
        let (a, b) = stream.as_bytes().split_at(20);
        decoder.feed(a, &mut out);
        decoder.feed(b, &mut out);

        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], DecodeEvent::Frame(Frame::Nmea(_))));
        assert!(matches!(out[1], DecodeEvent::CrcMismatch { packet_type: None, .. }));
        assert_eq!(decoder.stats().frames, 1);
        assert_eq!(decoder.stats().crc_errors, 1);
    }
}
