// SPDX-License-Identifier: GPL-3.0-only

//! Resolution of the slot, suffix, super device and group a command acts on.
//!
//! Resolution happens in two steps. [`Target::resolve`] checks the flags
//! before anything is read from disk; [`Target::with_group`] then picks the
//! group from the loaded table.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use lptools_sys::PartitionTable;
use lptools_types::{Slot, SlotSuffix};
use serde::Serialize;
use tracing::debug;

use crate::error::{LpError, Result};

/// Partition whose group becomes the default when `--group` is absent.
const DEFAULT_GROUP_ANCHOR: &str = "system";

/// System defaults, populated once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDefaults {
    pub suffix: SlotSuffix,
    pub super_path: PathBuf,
}

/// Context flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ContextArgs {
    pub slot: Option<Slot>,
    pub suffix: Option<SlotSuffix>,
    pub super_path: Option<PathBuf>,
    pub group: Option<String>,
}

/// Slot and super device, known before the table is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub slot: Slot,
    pub suffix: SlotSuffix,
    pub super_path: PathBuf,
}

/// Fully resolved context for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    pub slot: Slot,
    pub suffix: SlotSuffix,
    pub super_path: PathBuf,
    pub group: Option<String>,
}

impl Target {
    pub fn resolve(args: &ContextArgs, defaults: ContextDefaults) -> Result<Self> {
        let (slot, suffix) = resolve_slot(args.slot, args.suffix, defaults.suffix)?;
        let super_path = args.super_path.clone().unwrap_or(defaults.super_path);
        check_super_path(&super_path)?;

        Ok(Self {
            slot,
            suffix,
            super_path,
        })
    }

    /// Choose the target group. An explicit group must exist in `table`;
    /// otherwise the group of `system<suffix>` is used if there is one.
    pub fn with_group<T: PartitionTable>(self, table: &T, group: Option<&str>) -> Result<Context> {
        let group = match group {
            Some(name) => {
                if table.find_group(name).is_none() {
                    return Err(LpError::UnknownGroup(name.to_string()));
                }
                Some(name.to_string())
            }
            None => find_default_group(table, &self.suffix.apply(DEFAULT_GROUP_ANCHOR)),
        };

        Ok(Context {
            slot: self.slot,
            suffix: self.suffix,
            super_path: self.super_path,
            group,
        })
    }
}

impl Context {
    /// The resolved group, for operations that cannot run without one.
    pub fn require_group(&self) -> Result<&str> {
        self.group
            .as_deref()
            .ok_or_else(|| LpError::GroupNotResolved {
                searched: self.suffix.apply(DEFAULT_GROUP_ANCHOR),
            })
    }
}

fn resolve_slot(
    slot: Option<Slot>,
    suffix: Option<SlotSuffix>,
    system_suffix: SlotSuffix,
) -> Result<(Slot, SlotSuffix)> {
    match (slot, suffix) {
        (Some(slot), Some(suffix)) if suffix.slot() != slot => Err(LpError::InvalidArgument(
            format!("--slot {slot} conflicts with --suffix {suffix}"),
        )),
        (Some(slot), Some(suffix)) => Ok((slot, suffix)),
        (None, Some(suffix)) => Ok((suffix.slot(), suffix)),
        (Some(slot), None) if system_suffix == SlotSuffix::None => Ok((slot, SlotSuffix::None)),
        (Some(slot), None) => Ok((slot, SlotSuffix::for_slot(slot))),
        (None, None) => Ok((system_suffix.slot(), system_suffix)),
    }
}

fn check_super_path(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|_| LpError::PathNotFound(path.to_path_buf()))?;
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        return Err(LpError::PathIsDirectory(path.to_path_buf()));
    }
    if !file_type.is_file() && !file_type.is_block_device() {
        return Err(LpError::InvalidArgument(format!(
            "{} is neither a block device nor a regular file",
            path.display()
        )));
    }
    Ok(())
}

fn find_default_group<T: PartitionTable>(table: &T, partition: &str) -> Option<String> {
    let group = table
        .list_groups()
        .into_iter()
        .flat_map(|group| table.list_partitions_in_group(group))
        .find(|candidate| candidate.name == partition)
        .map(|found| found.group_name.clone());

    debug!("default group from {partition}: {group:?}");
    group
}
