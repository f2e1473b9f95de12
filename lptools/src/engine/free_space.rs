// SPDX-License-Identifier: GPL-3.0-only

use lptools_sys::PartitionTable;

use crate::error::{LpError, Result};
use crate::report::{FreeSpaceReport, GroupInfoReport, PartitionUsage};

/// Bytes still allocatable to a group.
///
/// The group headroom is used unless the group is unbounded (`maximum` of
/// 0) or the headroom exceeds what is free on the volume.
pub fn group_free_space(maximum: u64, group_used: u64, allocatable: u64, volume_used: u64) -> u64 {
    let volume_free = allocatable.saturating_sub(volume_used);
    if maximum == 0 {
        return volume_free;
    }
    maximum.saturating_sub(group_used).min(volume_free)
}

fn usage<T: PartitionTable>(table: &T, group: &str) -> Vec<PartitionUsage> {
    table
        .list_partitions_in_group(group)
        .into_iter()
        .map(|partition| PartitionUsage {
            name: partition.name.clone(),
            size: partition.bytes_on_disk(),
        })
        .collect()
}

pub fn free_space<T: PartitionTable>(table: &T, group: &str) -> Result<FreeSpaceReport> {
    let maximum = table
        .find_group(group)
        .map(|g| g.maximum_size)
        .ok_or_else(|| LpError::UnknownGroup(group.to_string()))?;
    let partitions = usage(table, group);
    let group_used: u64 = partitions.iter().map(|p| p.size).sum();

    Ok(FreeSpaceReport {
        group: group.to_string(),
        free_space: group_free_space(
            maximum,
            group_used,
            table.allocatable_space(),
            table.used_space(),
        ),
        partitions,
    })
}

pub fn group_info<T: PartitionTable>(table: &T, group: &str) -> Result<GroupInfoReport> {
    if table.find_group(group).is_none() {
        return Err(LpError::UnknownGroup(group.to_string()));
    }

    Ok(GroupInfoReport {
        group: group.to_string(),
        used_space: table.used_space(),
        allocatable_space: table.allocatable_space(),
        partitions: usage(table, group),
    })
}
