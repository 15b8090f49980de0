//! Identity and application descriptions parsed from device replies.
//!
//! Identity replies are whitespace separated text of the form
//! `<product> [<part number>] [<version>] SN:<serial>`, e.g.
//! `OpenIMU300ZI 5020-3021-01 1.1.1 SN:1808400153`. Tokens are recognised by
//! shape, so missing or reordered fields are tolerated.

use serde::Serialize;

use crate::dialect::DeviceDialect;

/// What the device reported about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_type: DeviceDialect,
    pub product: String,
    pub part_number: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    /// The reply as received.
    pub raw: String,
}

impl DeviceInfo {
    /// Parse an identity reply.
    pub fn parse(device_type: DeviceDialect, text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let product = tokens.first().map(|t| t.to_string()).unwrap_or_default();
        let rest = tokens.get(1..).unwrap_or_default();
        DeviceInfo {
            device_type,
            product,
            part_number: rest
                .iter()
                .find(|t| is_part_number(t))
                .map(|t| t.to_string()),
            serial_number: rest.iter().find_map(|t| serial_of(t)),
            firmware_version: rest.iter().find_map(|t| version_of(t)),
            raw: text.trim().to_string(),
        }
    }

    #[must_use]
    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.product, self.device_type)?;
        if let Some(pn) = &self.part_number {
            write!(f, " PN:{pn}")?;
        }
        if let Some(sn) = &self.serial_number {
            write!(f, " SN:{sn}")?;
        }
        if let Some(v) = &self.firmware_version {
            write!(f, " v{v}")?;
        }
        Ok(())
    }
}

/// The application running on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    /// Application name (`INS`, `RTK_INS`, `IMU`, ...).
    pub app_name: String,
    pub version: Option<String>,
    pub raw: String,
}

impl AppInfo {
    /// Parse a version reply such as `OpenIMU300ZI INS 19.0.0` or
    /// `RTK_INS App v2.0.0, Bootloader v1.1.1`.
    pub fn parse(text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let version_at = tokens.iter().position(|t| version_of(t).is_some());
        let head = &tokens[..version_at.unwrap_or(tokens.len())];
        let app_name = head
            .iter()
            .rev()
            .find(|t| !t.eq_ignore_ascii_case("app") && !is_product(t) && !is_part_number(t))
            .map(|t| t.trim_end_matches(',').to_string())
            .unwrap_or_default();
        AppInfo {
            app_name,
            version: version_at.and_then(|i| version_of(tokens[i])),
            raw: text.trim().to_string(),
        }
    }
}

impl std::fmt::Display for AppInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{} {}", self.app_name, v),
            None => f.write_str(&self.app_name),
        }
    }
}

fn is_part_number(token: &str) -> bool {
    token.len() >= 7
        && token.contains('-')
        && token.chars().all(|c| c.is_ascii_digit() || c == '-')
}

/// Product names mix letters and digits (`OpenIMU300ZI`, `INS401`).
fn is_product(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit()) && token.chars().any(|c| c.is_ascii_uppercase())
        && !token.contains('_')
}

fn serial_of(token: &str) -> Option<String> {
    let sn = token
        .strip_prefix("SN:")
        .or_else(|| token.strip_prefix("sn:"))?
        .trim_end_matches(',');
    (!sn.is_empty()).then(|| sn.to_string())
}

fn version_of(token: &str) -> Option<String> {
    let t = token.trim_end_matches(',');
    let t = t.strip_prefix(['v', 'V']).unwrap_or(t);
    let valid = t.starts_with(|c: char| c.is_ascii_digit())
        && t.contains('.')
        && t.chars().all(|c| c.is_ascii_digit() || c == '.');
    valid.then(|| t.to_string())
}
