// SPDX-License-Identifier: GPL-3.0-only

//! Startup configuration, read once from a TOML file.
//!
//! The file is taken from `--config`, then `LPTOOLS_CONFIG`, then
//! `/etc/lptools.toml` if it exists. Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lptools_sys::mapper::{DEFAULT_BLOCK_DEVICE_DIR, DEFAULT_MAPPER_DIR, DEFAULT_MAP_TIMEOUT};
use lptools_sys::{DmsetupMapper, MergeStatusGate, NoMergeGate, get_property};
use lptools_types::SlotSuffix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::ContextDefaults;
use crate::error::{LpError, Result};

pub const CONFIG_ENV: &str = "LPTOOLS_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/lptools.toml";
pub const DEFAULT_SUPER_PATH: &str = "/dev/block/by-name/super";
const SLOT_SUFFIX_PROPERTY: &str = "ro.boot.slot_suffix";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Step up `steps` levels of verbosity, stopping at trace.
    pub fn raised(self, steps: u8) -> Self {
        let mut level = self;
        for _ in 0..steps {
            level = match level {
                Self::Error => Self::Warn,
                Self::Warn => Self::Info,
                Self::Info => Self::Debug,
                Self::Debug | Self::Trace => Self::Trace,
            };
        }
        level
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MergeGateMode {
    #[default]
    Bootctl,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub super_path: PathBuf,
    pub slot_suffix: Option<String>,
    pub map_timeout_ms: u64,
    pub mapper_dir: PathBuf,
    pub block_device_dir: PathBuf,
    pub dmsetup: Option<PathBuf>,
    pub bootctl: Option<PathBuf>,
    pub merge_gate: MergeGateMode,
    pub log_level: LoggingLevel,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            super_path: PathBuf::from(DEFAULT_SUPER_PATH),
            slot_suffix: None,
            map_timeout_ms: DEFAULT_MAP_TIMEOUT.as_millis() as u64,
            mapper_dir: PathBuf::from(DEFAULT_MAPPER_DIR),
            block_device_dir: PathBuf::from(DEFAULT_BLOCK_DEVICE_DIR),
            dmsetup: None,
            bootctl: None,
            merge_gate: MergeGateMode::default(),
            log_level: LoggingLevel::default(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when no file is
    /// configured. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let system = Path::new(SYSTEM_CONFIG_PATH);
        if system.is_file() {
            return Self::from_file(system);
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LpError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&contents)
            .map_err(|e| LpError::Config(format!("{}: {e}", path.display())))?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn map_timeout(&self) -> Duration {
        Duration::from_millis(self.map_timeout_ms)
    }

    /// Defaults handed to the context resolver. The system suffix comes from
    /// the file, then the boot property, then empty.
    pub fn context_defaults(&self) -> Result<ContextDefaults> {
        let suffix = match &self.slot_suffix {
            Some(value) => SlotSuffix::parse_default(value).ok_or_else(|| {
                LpError::Config(format!("slot_suffix '{value}' is not a slot suffix"))
            })?,
            None => Self::property_suffix(),
        };

        Ok(ContextDefaults {
            suffix,
            super_path: self.super_path.clone(),
        })
    }

    fn property_suffix() -> SlotSuffix {
        let Some(value) = get_property(SLOT_SUFFIX_PROPERTY) else {
            return SlotSuffix::None;
        };
        SlotSuffix::parse_default(&value).unwrap_or_else(|| {
            warn!("ignoring malformed {SLOT_SUFFIX_PROPERTY} value '{value}'");
            SlotSuffix::None
        })
    }

    pub fn mapper(&self) -> DmsetupMapper {
        match &self.dmsetup {
            Some(binary) => DmsetupMapper::new(
                binary.clone(),
                self.mapper_dir.clone(),
                self.block_device_dir.clone(),
            ),
            None => DmsetupMapper::locate(self.mapper_dir.clone(), self.block_device_dir.clone()),
        }
    }

    pub fn merge_gate(&self) -> Box<dyn MergeStatusGate> {
        match self.merge_gate {
            MergeGateMode::Disabled => Box::new(NoMergeGate),
            MergeGateMode::Bootctl => self.bootctl_gate(),
        }
    }

    #[cfg(feature = "bootctl")]
    fn bootctl_gate(&self) -> Box<dyn MergeStatusGate> {
        use lptools_sys::BootctlMergeGate;

        match &self.bootctl {
            Some(binary) => Box::new(BootctlMergeGate::new(Some(binary.clone()))),
            None => Box::new(BootctlMergeGate::locate()),
        }
    }

    #[cfg(not(feature = "bootctl"))]
    fn bootctl_gate(&self) -> Box<dyn MergeStatusGate> {
        debug!("built without bootctl support, merge gate always passes");
        Box::new(NoMergeGate)
    }
}
