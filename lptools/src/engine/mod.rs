// SPDX-License-Identifier: GPL-3.0-only

//! Command execution against a loaded partition table.
//!
//! Every mutating command follows the same order: tear down any mapping
//! the change would invalidate, mutate the table in memory, commit it once,
//! then map again where needed. A table that is not committed is dropped
//! and the stored metadata is left as it was.

pub mod free_space;
pub mod transplant;

use std::path::PathBuf;
use std::time::Duration;

use enumflags2::BitFlags;
use lptools_sys::{
    ActivateRequest, DeviceState, LogicalMapper, MergeStatus, MergeStatusGate, PartitionTable,
};
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{LpError, Result};
use crate::report::{
    ClearCowReport, CreateReport, FreeSpaceReport, GroupInfoReport, MapReport, Outcome,
    RemoveReport, ReplaceReport, ResizeReport, TeardownFailure, UnlimitedGroupReport, UnmapReport,
};

/// Group holding snapshot copy-on-write partitions.
pub const COW_GROUP: &str = "cow";
const COW_SUFFIX: &str = "-cow";

/// One lptools command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create { name: String, size: u64 },
    Remove { name: String },
    Resize { name: String, size: u64 },
    Replace { original: String, replacement: String },
    Map { name: String },
    Unmap { name: String },
    Free,
    GetInfo,
    UnlimitedGroup,
    ClearCow,
}

pub struct Engine<'a> {
    context: &'a Context,
    mapper: &'a dyn LogicalMapper,
    merge_gate: &'a dyn MergeStatusGate,
    timeout: Duration,
}

impl<'a> Engine<'a> {
    pub fn new(
        context: &'a Context,
        mapper: &'a dyn LogicalMapper,
        merge_gate: &'a dyn MergeStatusGate,
        timeout: Duration,
    ) -> Self {
        Self {
            context,
            mapper,
            merge_gate,
            timeout,
        }
    }

    pub fn execute<T: PartitionTable>(&self, table: T, operation: Operation) -> Result<Outcome> {
        match operation {
            Operation::Create { name, size } => self.create(table, &name, size).map(Outcome::Create),
            Operation::Remove { name } => self.remove(table, &name).map(Outcome::Remove),
            Operation::Resize { name, size } => self.resize(table, &name, size).map(Outcome::Resize),
            Operation::Replace {
                original,
                replacement,
            } => self
                .replace(table, &original, &replacement)
                .map(Outcome::Replace),
            Operation::Map { name } => self.map(&name).map(Outcome::Map),
            Operation::Unmap { name } => self.unmap(&name).map(Outcome::Unmap),
            Operation::Free => self.free(&table).map(Outcome::Free),
            Operation::GetInfo => self.get_info(&table).map(Outcome::GetInfo),
            Operation::UnlimitedGroup => self.unlimited_group(table).map(Outcome::UnlimitedGroup),
            Operation::ClearCow => self.clear_cow(table).map(Outcome::ClearCow),
        }
    }

    /// Add `name` to the resolved group, grow it to `size`, commit, then map it.
    pub fn create<T: PartitionTable>(
        &self,
        mut table: T,
        name: &str,
        size: u64,
    ) -> Result<CreateReport> {
        let group = self.context.require_group()?;
        if table.find_partition(name).is_some() {
            return Err(LpError::AlreadyExists(name.to_string()));
        }

        table.add_partition(name, group, BitFlags::empty())?;
        table.resize_partition(name, size)?;
        let size = table
            .find_partition(name)
            .map(|partition| partition.bytes_on_disk())
            .unwrap_or_default();

        commit(table)?;
        info!("Created {name} in {group} with {size} bytes");
        let device = self.activate(name)?;

        Ok(CreateReport {
            partition: name.to_string(),
            group: group.to_string(),
            size,
            device,
        })
    }

    /// Remove `name`, unmapping it first. Removing an absent partition still
    /// succeeds, and a failed unmap is reported but does not stop removal.
    pub fn remove<T: PartitionTable>(&self, mut table: T, name: &str) -> Result<RemoveReport> {
        let mut unmapped = false;
        let mut teardown_error = None;
        if self.is_mapped(name) {
            match self.deactivate(name) {
                Ok(()) => unmapped = true,
                Err(e) => {
                    warn!("{e}");
                    teardown_error = Some(e.to_string());
                }
            }
        }

        let existed = table.find_partition(name).is_some();
        table.remove_partition(name);
        commit(table)?;
        if existed {
            info!("Removed {name}");
        }

        Ok(RemoveReport {
            partition: name.to_string(),
            existed,
            unmapped,
            teardown_error,
        })
    }

    /// Resize `name`, remapping it afterwards if it was mapped before.
    pub fn resize<T: PartitionTable>(
        &self,
        mut table: T,
        name: &str,
        size: u64,
    ) -> Result<ResizeReport> {
        let old_size = table
            .find_partition(name)
            .map(|partition| partition.bytes_on_disk())
            .ok_or_else(|| LpError::NotFound(name.to_string()))?;

        let was_mapped = self.is_mapped(name);
        if was_mapped {
            self.deactivate(name)?;
        }

        table.resize_partition(name, size)?;
        let new_size = table
            .find_partition(name)
            .map(|partition| partition.bytes_on_disk())
            .unwrap_or_default();

        commit(table)?;
        info!("Resized {name} from {old_size} to {new_size} bytes");

        let device = if was_mapped {
            Some(self.activate(name)?)
        } else {
            None
        };

        Ok(ResizeReport {
            partition: name.to_string(),
            old_size,
            new_size,
            device,
        })
    }

    /// Give the extents of `original` to a fresh `replacement` partition in
    /// the resolved group. One commit per call.
    pub fn replace<T: PartitionTable>(
        &self,
        mut table: T,
        original: &str,
        replacement: &str,
    ) -> Result<ReplaceReport> {
        let group = self.context.require_group()?;
        if table.find_partition(original).is_none() {
            return Err(LpError::NotFound(original.to_string()));
        }

        let replacement_was_mapped = self.is_mapped(replacement);
        for name in [original, replacement] {
            if self.is_mapped(name) {
                self.deactivate(name)?;
            }
        }

        let extents = transplant::transplant(&mut table, original, replacement, group)?;
        commit(table)?;
        info!("Replaced {original} with {replacement} in {group}");

        let device = if replacement_was_mapped {
            Some(self.activate(replacement)?)
        } else {
            None
        };

        Ok(ReplaceReport {
            original: original.to_string(),
            replacement: replacement.to_string(),
            group: group.to_string(),
            extents,
            device,
        })
    }

    pub fn map(&self, name: &str) -> Result<MapReport> {
        let device = self.activate(name)?;
        Ok(MapReport {
            partition: name.to_string(),
            device,
        })
    }

    pub fn unmap(&self, name: &str) -> Result<UnmapReport> {
        let was_mapped = self.is_mapped(name);
        if was_mapped {
            self.deactivate(name)?;
        }
        Ok(UnmapReport {
            partition: name.to_string(),
            was_mapped,
        })
    }

    pub fn free<T: PartitionTable>(&self, table: &T) -> Result<FreeSpaceReport> {
        free_space::free_space(table, self.context.require_group()?)
    }

    pub fn get_info<T: PartitionTable>(&self, table: &T) -> Result<GroupInfoReport> {
        free_space::group_info(table, self.context.require_group()?)
    }

    pub fn unlimited_group<T: PartitionTable>(&self, mut table: T) -> Result<UnlimitedGroupReport> {
        let group = self.context.require_group()?;
        let previous_maximum = table
            .find_group(group)
            .map(|g| g.maximum_size)
            .ok_or_else(|| LpError::UnknownGroup(group.to_string()))?;

        table.change_group_size(group, 0)?;
        commit(table)?;
        info!("Group {group} is now unlimited");

        Ok(UnlimitedGroupReport {
            group: group.to_string(),
            previous_maximum,
        })
    }

    /// Drop every `*-cow` partition of the `cow` group once no snapshot
    /// merge is pending.
    pub fn clear_cow<T: PartitionTable>(&self, mut table: T) -> Result<ClearCowReport> {
        let status = self.merge_gate.query().unwrap_or_else(|e| {
            warn!("could not query snapshot merge status: {e}");
            MergeStatus::Unknown
        });
        if !status.is_clear() {
            return Err(LpError::MergeInProgress(status));
        }

        let targets: Vec<(String, u64)> = table
            .list_partitions_in_group(COW_GROUP)
            .into_iter()
            .filter(|partition| partition.name.ends_with(COW_SUFFIX))
            .map(|partition| (partition.name.clone(), partition.bytes_on_disk()))
            .collect();

        let mut teardown_failures = Vec::new();
        for (name, _) in &targets {
            if !self.is_mapped(name) {
                continue;
            }
            if let Err(e) = self.deactivate(name) {
                warn!("{e}");
                teardown_failures.push(TeardownFailure {
                    partition: name.clone(),
                    error: e.to_string(),
                });
            }
        }

        for (name, _) in &targets {
            table.remove_partition(name);
            info!("Deleting {name}");
        }
        commit(table)?;

        Ok(ClearCowReport {
            reclaimed: targets.iter().map(|(_, bytes)| bytes).sum(),
            removed: targets.into_iter().map(|(name, _)| name).collect(),
            teardown_failures,
        })
    }

    fn is_mapped(&self, name: &str) -> bool {
        self.mapper.state(name) != DeviceState::Inactive
    }

    fn activate(&self, name: &str) -> Result<PathBuf> {
        let request = ActivateRequest {
            super_path: &self.context.super_path,
            slot: self.context.slot,
            partition_name: name,
            timeout: self.timeout,
            force_writable: true,
        };
        self.mapper
            .activate(&request)
            .map_err(|source| LpError::MapFailed {
                partition: name.to_string(),
                source,
            })
    }

    fn deactivate(&self, name: &str) -> Result<()> {
        self.mapper
            .deactivate(name, self.timeout)
            .map_err(|source| LpError::UnmapFailed {
                partition: name.to_string(),
                source,
            })
    }
}

fn commit<T: PartitionTable>(table: T) -> Result<()> {
    table.commit().map_err(LpError::CommitFailed)
}
