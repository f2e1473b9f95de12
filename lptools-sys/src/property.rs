// SPDX-License-Identifier: GPL-3.0-only

//! System property lookup through `getprop`.

use tracing::debug;

use crate::cmd::run_command;

/// Read a system property. Returns `None` when `getprop` is missing, fails,
/// or the property is empty.
pub fn get_property(key: &str) -> Option<String> {
    let getprop = which::which("getprop").ok()?;
    match run_command(&getprop, &[key]) {
        Ok(value) => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Err(e) => {
            debug!("getprop {key}: {e}");
            None
        }
    }
}
