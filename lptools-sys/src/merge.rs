// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot merge status, consulted before COW partitions are reclaimed.

use std::fmt;

use serde::Serialize;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    None,
    Unknown,
    Snapshotted,
    Merging,
    Cancelled,
}

impl MergeStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "unknown" => Some(Self::Unknown),
            "snapshotted" => Some(Self::Snapshotted),
            "merging" => Some(Self::Merging),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Only a device with no pending merge may drop its COW partitions.
    pub fn is_clear(self) -> bool {
        self == Self::None
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Unknown => "unknown",
            Self::Snapshotted => "snapshotted",
            Self::Merging => "merging",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

pub trait MergeStatusGate {
    fn query(&self) -> Result<MergeStatus>;
}

/// Gate used when boot control is unavailable or disabled: always clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMergeGate;

impl MergeStatusGate for NoMergeGate {
    fn query(&self) -> Result<MergeStatus> {
        Ok(MergeStatus::None)
    }
}

#[cfg(feature = "bootctl")]
pub use bootctl::BootctlMergeGate;

#[cfg(feature = "bootctl")]
mod bootctl {
    use std::path::PathBuf;

    use tracing::{debug, warn};

    use super::{MergeStatus, MergeStatusGate};
    use crate::Result;
    use crate::cmd::run_command;

    /// Reads the merge status through `bootctl get-snapshot-merge-status`.
    #[derive(Debug, Clone)]
    pub struct BootctlMergeGate {
        binary: Option<PathBuf>,
    }

    impl BootctlMergeGate {
        pub fn new(binary: Option<PathBuf>) -> Self {
            Self { binary }
        }

        /// Use `bootctl` from PATH when present.
        pub fn locate() -> Self {
            Self::new(which::which("bootctl").ok())
        }
    }

    impl MergeStatusGate for BootctlMergeGate {
        fn query(&self) -> Result<MergeStatus> {
            let Some(binary) = &self.binary else {
                warn!("bootctl is not available, assuming no snapshot merge is pending");
                return Ok(MergeStatus::None);
            };

            let output = run_command(binary, &["get-snapshot-merge-status"])?;
            let status = MergeStatus::parse(&output).unwrap_or_else(|| {
                debug!("unrecognised merge status {:?}", output.trim());
                MergeStatus::Unknown
            });
            debug!("snapshot merge status: {status}");
            Ok(status)
        }
    }
}
