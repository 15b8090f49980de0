//! Driver configuration.
//!
//! Loaded from a YAML file; every field has a default so an empty file (or
//! no file at all) gives a working setup.
//!
//! ```yaml
//! discovery:
//!   baud_rates: [115200, 230400]
//!   max_threads: 2
//! transaction:
//!   timeout_ms: 2000
//! upgrade:
//!   block_size: 192
//!   first_block_delay_ms: 6000
//! last_connection_path: /var/lib/navlink/connection.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Default location of the last-connection record, relative to the working directory.
pub const DEFAULT_LAST_CONNECTION_PATH: &str = ".navlink/connection.json";

/// Port discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Baud rates tried on every port, in order.
    pub baud_rates: Vec<u32>,
    /// Upper bound on concurrently probing threads.
    pub max_threads: usize,
    /// How long to wait for an identity reply.
    pub probe_timeout_ms: u64,
    /// Serial read poll interval.
    pub read_poll_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            baud_rates: vec![115_200, 57_600, 230_400, 38_400, 460_800],
            max_threads: 4,
            probe_timeout_ms: 300,
            read_poll_ms: 20,
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }
}

/// Request/response settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Default deadline for one transaction.
    pub timeout_ms: u64,
    /// Timeout checker period.
    pub tick_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            timeout_ms: 1000,
            tick_ms: 100,
        }
    }
}

impl TransactionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Firmware upgrade settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Data bytes per write command (capped by the framing).
    pub block_size: usize,
    /// Resends of a block whose acknowledgement timed out.
    pub retries: u32,
    /// Acknowledgement deadline for one block.
    pub block_timeout_ms: u64,
    /// Extra time allowed for the first block while the bootloader erases flash.
    pub first_block_delay_ms: u64,
    /// Wait after jumping to the bootloader.
    pub bootloader_settle_ms: u64,
    /// Wait after jumping back to the application.
    pub application_settle_ms: u64,
    /// Identity requests sent after the application restarts.
    pub ping_attempts: u32,
    /// Line rate the bootloader runs at, when different from the application's.
    pub bootloader_baud: Option<u32>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        UpgradeConfig {
            block_size: 240,
            retries: 3,
            block_timeout_ms: 1000,
            first_block_delay_ms: 5000,
            bootloader_settle_ms: 3000,
            application_settle_ms: 5000,
            ping_attempts: 3,
            bootloader_baud: None,
        }
    }
}

impl UpgradeConfig {
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn first_block_delay(&self) -> Duration {
        Duration::from_millis(self.first_block_delay_ms)
    }

    pub fn bootloader_settle(&self) -> Duration {
        Duration::from_millis(self.bootloader_settle_ms)
    }

    pub fn application_settle(&self) -> Duration {
        Duration::from_millis(self.application_settle_ms)
    }
}

/// Complete driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub discovery: DiscoveryConfig,
    pub transaction: TransactionConfig,
    pub upgrade: UpgradeConfig,
    /// Directory searched for `<dialect>.json` schema overrides.
    pub schema_dir: Option<PathBuf>,
    /// Where the last successful connection is remembered.
    pub last_connection_path: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            discovery: DiscoveryConfig::default(),
            transaction: TransactionConfig::default(),
            upgrade: UpgradeConfig::default(),
            schema_dir: None,
            last_connection_path: PathBuf::from(DEFAULT_LAST_CONNECTION_PATH),
        }
    }
}

impl DriverConfig {
    /// Parse YAML text. Missing sections and fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(DriverConfig::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path).map_err(|e| DriverError::io(path, e))?;
        Self::from_yaml_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(
            config.discovery.baud_rates,
            vec![115_200, 57_600, 230_400, 38_400, 460_800]
        );
        assert_eq!(config.discovery.max_threads, 4);
        assert_eq!(config.transaction.timeout(), Duration::from_secs(1));
        assert_eq!(config.transaction.tick(), Duration::from_millis(100));
        assert_eq!(config.upgrade.block_size, 240);
        assert_eq!(
            config.last_connection_path,
            PathBuf::from(".navlink/connection.json")
        );
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = DriverConfig::from_yaml_str(
            "discovery:\n  baud_rates: [230400]\nupgrade:\n  retries: 5\n",
        )
        .unwrap();
        assert_eq!(config.discovery.baud_rates, vec![230_400]);
        assert_eq!(config.discovery.max_threads, 4);
        assert_eq!(config.upgrade.retries, 5);
        assert_eq!(config.upgrade.block_size, 240);
        assert_eq!(config.transaction, TransactionConfig::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(DriverConfig::from_yaml_str("").unwrap(), DriverConfig::default());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            DriverConfig::from_yaml_str("discovery: [1, 2"),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DriverConfig::load(Path::new("/nonexistent/navlink.yaml")).unwrap_err();
        assert!(matches!(err, DriverError::Io { .. }));
    }
}
