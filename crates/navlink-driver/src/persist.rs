//! Last known good connection.
//!
//! A single JSON record read and written whole. A missing or unreadable
//! record means "no history"; discovery then falls back to enumeration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Where a device was last found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastConnection {
    pub port: String,
    pub baud: u32,
    /// Dialect name (`openimu`, `dmu`, ...).
    pub device_type: String,
}

/// File-backed store for [`LastConnection`].
#[derive(Debug, Clone)]
pub struct LastConnectionStore {
    path: PathBuf,
}

impl LastConnectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LastConnectionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored record, or `None` when missing or corrupt.
    pub fn load(&self) -> Option<LastConnection> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("cannot read {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("ignoring corrupt {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Replace the stored record.
    pub fn save(&self, record: &LastConnection) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DriverError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, json).map_err(|e| DriverError::io(&self.path, e))?;
        tracing::debug!("saved last connection {}@{}", record.port, record.baud);
        Ok(())
    }

    /// Forget the stored record.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::io(&self.path, e)),
        }
    }
}
