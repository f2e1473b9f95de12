// SPDX-License-Identifier: GPL-3.0-only

use enumflags2::BitFlags;
use lptools_types::{
    BlockDevice, Extent, Group, LpMetadata, METADATA_VERSION, Partition, PartitionAttribute,
    SECTOR_SIZE, align_up,
};
use tracing::debug;

use crate::error::TableError;

/// Name of the group every table carries.
pub const DEFAULT_GROUP: &str = "default";

/// Free sector range `[start, end)` on one block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    device_index: u32,
    start: u64,
    end: u64,
}

impl Region {
    fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// In-memory partition table with a first-fit extent allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBuilder {
    logical_block_size: u32,
    block_devices: Vec<BlockDevice>,
    groups: Vec<Group>,
    partitions: Vec<Partition>,
}

impl MetadataBuilder {
    /// Create an empty table holding only the default group.
    pub fn new(block_devices: Vec<BlockDevice>, logical_block_size: u32) -> Self {
        Self {
            logical_block_size,
            block_devices,
            groups: vec![Group {
                name: DEFAULT_GROUP.to_string(),
                maximum_size: 0,
            }],
            partitions: Vec::new(),
        }
    }

    /// Rebuild a table from stored metadata, validating its layout.
    pub fn from_metadata(metadata: LpMetadata) -> Result<Self, TableError> {
        if metadata.block_devices.is_empty() {
            return Err(TableError::InvalidLayout(
                "metadata lists no block devices".to_string(),
            ));
        }
        if metadata.logical_block_size == 0
            || u64::from(metadata.logical_block_size) % SECTOR_SIZE != 0
        {
            return Err(TableError::InvalidLayout(format!(
                "logical block size {} is not a multiple of {SECTOR_SIZE}",
                metadata.logical_block_size
            )));
        }

        for device in &metadata.block_devices {
            let reserved = device.first_logical_sector.checked_mul(SECTOR_SIZE);
            if reserved.is_none_or(|reserved| reserved > device.size) {
                return Err(TableError::InvalidLayout(format!(
                    "{} starts its extents past the end of the device",
                    device.partition_name
                )));
            }
        }

        for (index, group) in metadata.groups.iter().enumerate() {
            if metadata.groups[..index].iter().any(|g| g.name == group.name) {
                return Err(TableError::GroupExists(group.name.clone()));
            }
        }

        for (index, partition) in metadata.partitions.iter().enumerate() {
            if metadata.partitions[..index]
                .iter()
                .any(|p| p.name == partition.name)
            {
                return Err(TableError::AlreadyExists(partition.name.clone()));
            }
            if metadata.find_group(&partition.group_name).is_none() {
                return Err(TableError::GroupNotFound(partition.group_name.clone()));
            }
            let total = partition
                .extents
                .iter()
                .try_fold(0u64, |total, extent| total.checked_add(extent.num_sectors()));
            if total.and_then(|sectors| sectors.checked_mul(SECTOR_SIZE)).is_none() {
                return Err(TableError::InvalidLayout(format!(
                    "{} is larger than any device can hold",
                    partition.name
                )));
            }
            for extent in &partition.extents {
                let Some((device_index, start, end)) = extent.physical_range() else {
                    continue;
                };
                let device = metadata
                    .block_devices
                    .get(device_index as usize)
                    .ok_or_else(|| {
                        TableError::InvalidLayout(format!(
                            "{} references block device {device_index}",
                            partition.name
                        ))
                    })?;
                if start < device.first_logical_sector || end > device.end_sector() {
                    return Err(TableError::InvalidLayout(format!(
                        "{} has an extent outside {} ({start}..{end})",
                        partition.name, device.partition_name
                    )));
                }
            }
        }

        Ok(Self {
            logical_block_size: metadata.logical_block_size,
            block_devices: metadata.block_devices,
            groups: metadata.groups,
            partitions: metadata.partitions,
        })
    }

    pub fn export(&self) -> LpMetadata {
        LpMetadata {
            version: METADATA_VERSION,
            logical_block_size: self.logical_block_size,
            block_devices: self.block_devices.clone(),
            groups: self.groups.clone(),
            partitions: self.partitions.clone(),
        }
    }

    pub fn add_group(&mut self, name: &str, maximum_size: u64) -> Result<(), TableError> {
        if self.find_group(name).is_some() {
            return Err(TableError::GroupExists(name.to_string()));
        }
        self.groups.push(Group {
            name: name.to_string(),
            maximum_size,
        });
        Ok(())
    }

    pub fn list_groups(&self) -> Vec<&str> {
        self.groups.iter().map(|group| group.name.as_str()).collect()
    }

    pub fn list_partitions_in_group(&self, group: &str) -> Vec<&Partition> {
        self.partitions
            .iter()
            .filter(|partition| partition.group_name == group)
            .collect()
    }

    pub fn find_partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|partition| partition.name == name)
    }

    pub fn find_group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.name == name)
    }

    fn partition_index(&self, name: &str) -> Result<usize, TableError> {
        self.partitions
            .iter()
            .position(|partition| partition.name == name)
            .ok_or_else(|| TableError::PartitionNotFound(name.to_string()))
    }

    pub fn add_partition(
        &mut self,
        name: &str,
        group: &str,
        attributes: BitFlags<PartitionAttribute>,
    ) -> Result<(), TableError> {
        if self.find_partition(name).is_some() {
            return Err(TableError::AlreadyExists(name.to_string()));
        }
        if self.find_group(group).is_none() {
            return Err(TableError::GroupNotFound(group.to_string()));
        }

        let mut partition = Partition::new(name, group);
        partition.attributes = attributes.bits();
        self.partitions.push(partition);
        debug!("added partition {name} to group {group}");
        Ok(())
    }

    pub fn remove_partition(&mut self, name: &str) {
        let before = self.partitions.len();
        self.partitions.retain(|partition| partition.name != name);
        if self.partitions.len() != before {
            debug!("removed partition {name}");
        }
    }

    pub fn add_extent(&mut self, name: &str, extent: Extent) -> Result<(), TableError> {
        if let Some((device_index, _, _)) = extent.physical_range()
            && self.block_devices.get(device_index as usize).is_none()
        {
            return Err(TableError::InvalidLayout(format!(
                "block device {device_index} does not exist"
            )));
        }
        let index = self.partition_index(name)?;
        self.partitions[index].extents.push(extent);
        Ok(())
    }

    pub fn change_group_size(&mut self, group: &str, maximum_size: u64) -> Result<(), TableError> {
        let entry = self
            .groups
            .iter_mut()
            .find(|entry| entry.name == group)
            .ok_or_else(|| TableError::GroupNotFound(group.to_string()))?;
        entry.maximum_size = maximum_size;
        Ok(())
    }

    pub fn allocatable_space(&self) -> u64 {
        self.block_devices
            .iter()
            .map(BlockDevice::allocatable_bytes)
            .fold(0, u64::saturating_add)
    }

    pub fn used_space(&self) -> u64 {
        self.partitions.iter().map(Partition::linear_bytes).sum()
    }

    fn group_usage(&self, group: &str) -> u64 {
        self.list_partitions_in_group(group)
            .iter()
            .map(|partition| partition.bytes_on_disk())
            .sum()
    }

    pub fn resize_partition(&mut self, name: &str, size: u64) -> Result<(), TableError> {
        let index = self.partition_index(name)?;
        let aligned = align_up(size, u64::from(self.logical_block_size));
        let target_sectors = aligned / SECTOR_SIZE;
        let current_sectors = self.partitions[index].num_sectors();

        if target_sectors == current_sectors {
            return Ok(());
        }
        if target_sectors < current_sectors {
            shrink_extents(&mut self.partitions[index].extents, target_sectors);
            debug!("shrank {name} to {aligned} bytes");
            return Ok(());
        }

        let partition = &self.partitions[index];
        let insufficient = || TableError::InsufficientSpace {
            partition: name.to_string(),
            requested: size,
        };

        if let Some(group) = self.find_group(&partition.group_name)
            && !group.is_unbounded()
        {
            let others = self.group_usage(&group.name) - partition.bytes_on_disk();
            if others + aligned > group.maximum_size {
                debug!(
                    "group {} limit {} would be exceeded by {name}",
                    group.name, group.maximum_size
                );
                return Err(insufficient());
            }
        }

        let new_extents = self
            .allocate(target_sectors - current_sectors)
            .ok_or_else(insufficient)?;

        let extents = &mut self.partitions[index].extents;
        for extent in new_extents {
            append_extent(extents, extent);
        }
        debug!("grew {name} to {aligned} bytes");
        Ok(())
    }

    /// Free regions of every block device, aligned to the device alignment.
    fn free_regions(&self) -> Vec<Region> {
        let mut regions = Vec::new();

        for (device_index, device) in self.block_devices.iter().enumerate() {
            let device_index = device_index as u32;
            let mut used: Vec<(u64, u64)> = self
                .partitions
                .iter()
                .flat_map(|partition| partition.extents.iter())
                .filter_map(Extent::physical_range)
                .filter(|(index, _, _)| *index == device_index)
                .map(|(_, start, end)| (start, end))
                .collect();
            used.sort_unstable();

            let alignment = (device.alignment / SECTOR_SIZE).max(1);
            let mut cursor = device.first_logical_sector;
            let end_sector = device.end_sector();
            let mut push_gap = |start: u64, end: u64| {
                let start = align_up(start, alignment);
                if start < end {
                    regions.push(Region {
                        device_index,
                        start,
                        end,
                    });
                }
            };

            for (start, end) in used {
                if start > cursor {
                    push_gap(cursor, start);
                }
                cursor = cursor.max(end);
            }
            if cursor < end_sector {
                push_gap(cursor, end_sector);
            }
        }

        regions
    }

    /// Pick linear extents totalling `sectors`, or `None` if they do not fit.
    fn allocate(&self, sectors: u64) -> Option<Vec<Extent>> {
        let mut remaining = sectors;
        let mut extents = Vec::new();

        for region in self.free_regions() {
            if remaining == 0 {
                break;
            }
            let take = region.len().min(remaining);
            extents.push(Extent::linear(take, region.device_index, region.start));
            remaining -= take;
        }

        (remaining == 0).then_some(extents)
    }
}

/// Append, merging with the previous extent when physically contiguous.
fn append_extent(extents: &mut Vec<Extent>, extent: Extent) {
    if let (
        Some(Extent::Linear {
            num_sectors,
            device_index,
            physical_sector,
        }),
        Extent::Linear {
            num_sectors: added,
            device_index: added_device,
            physical_sector: added_start,
        },
    ) = (extents.last_mut(), &extent)
        && *device_index == *added_device
        && *physical_sector + *num_sectors == *added_start
    {
        *num_sectors += added;
        return;
    }
    extents.push(extent);
}

/// Trim extents from the end until exactly `target` sectors remain.
fn shrink_extents(extents: &mut Vec<Extent>, target: u64) {
    let mut kept = 0;
    let mut keep = 0;

    for extent in extents.iter_mut() {
        if kept >= target {
            break;
        }
        let wanted = target - kept;
        if extent.num_sectors() > wanted {
            match extent {
                Extent::Linear { num_sectors, .. } | Extent::Zero { num_sectors } => {
                    *num_sectors = wanted;
                }
            }
        }
        kept += extent.num_sectors();
        keep += 1;
    }

    extents.truncate(keep);
}
