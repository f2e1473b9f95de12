// SPDX-License-Identifier: GPL-3.0-only

//! Activation of logical partitions as block devices.

mod dmsetup;

pub use dmsetup::{DEFAULT_BLOCK_DEVICE_DIR, DEFAULT_MAPPER_DIR, DmsetupMapper, build_dm_table};

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use lptools_types::Slot;
use serde::Serialize;

use crate::{Result, SysError};

/// Default wait for a mapped device node to appear or disappear.
pub const DEFAULT_MAP_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Inactive,
    Suspended,
    Active,
}

/// Parameters for [`LogicalMapper::activate`].
#[derive(Debug, Clone, Copy)]
pub struct ActivateRequest<'a> {
    pub super_path: &'a Path,
    pub slot: Slot,
    pub partition_name: &'a str,
    pub timeout: Duration,
    pub force_writable: bool,
}

pub trait LogicalMapper {
    fn state(&self, name: &str) -> DeviceState;

    /// Map a partition from the committed metadata of `request.slot` and
    /// return the device node once it is usable.
    fn activate(&self, request: &ActivateRequest<'_>) -> Result<PathBuf>;

    /// Tear down a mapped partition, waiting for its node to go away.
    fn deactivate(&self, name: &str, timeout: Duration) -> Result<()>;
}

/// Poll `ready` until it holds or `timeout` expires.
pub(crate) fn wait_for(what: &str, timeout: Duration, mut ready: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if ready() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(SysError::Timeout {
                what: what.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_returns_once_ready() {
        let mut polls = 0;
        wait_for("counter", Duration::from_secs(1), || {
            polls += 1;
            polls >= 3
        })
        .expect("becomes ready");
        assert_eq!(polls, 3);
    }

    #[test]
    fn wait_for_times_out() {
        let err = wait_for("never", Duration::from_millis(50), || false).expect_err("timeout");
        assert!(matches!(err, SysError::Timeout { .. }));
    }
}
