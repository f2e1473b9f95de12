// SPDX-License-Identifier: GPL-3.0-only

//! Partition table models.
//!
//! `LpMetadata` is the document stored for one slot of a super device. It
//! lists the physical block devices that host extents, the quota groups and
//! the logical partitions. Partitions reference their group by name and own
//! an ordered list of extents; the order defines the logical byte layout.

use enumflags2::{BitFlags, bitflags};
use serde::{Deserialize, Serialize};

use crate::common::SECTOR_SIZE;

/// Version written into freshly exported metadata.
pub const METADATA_VERSION: u32 = 1;

/// Partition attribute flags.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionAttribute {
    Readonly = 1 << 0,
    SlotSuffixed = 1 << 1,
    Updated = 1 << 2,
    Disabled = 1 << 3,
}

/// A contiguous run of sectors belonging to a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extent {
    /// Backed by `num_sectors` physical sectors starting at
    /// `physical_sector` on block device `device_index`.
    Linear {
        num_sectors: u64,
        device_index: u32,
        physical_sector: u64,
    },
    /// Placeholder that reads back as zeroes and occupies no physical space.
    Zero { num_sectors: u64 },
}

impl Extent {
    pub fn linear(num_sectors: u64, device_index: u32, physical_sector: u64) -> Self {
        Self::Linear {
            num_sectors,
            device_index,
            physical_sector,
        }
    }

    pub fn zero(num_sectors: u64) -> Self {
        Self::Zero { num_sectors }
    }

    pub fn num_sectors(&self) -> u64 {
        match self {
            Self::Linear { num_sectors, .. } | Self::Zero { num_sectors } => *num_sectors,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Linear { .. })
    }

    /// Physical sector range `[start, end)` and device for linear extents.
    /// The end saturates, so a corrupt extent lands past any device.
    pub fn physical_range(&self) -> Option<(u32, u64, u64)> {
        match self {
            Self::Linear {
                num_sectors,
                device_index,
                physical_sector,
            } => Some((
                *device_index,
                *physical_sector,
                physical_sector.saturating_add(*num_sectors),
            )),
            Self::Zero { .. } => None,
        }
    }
}

/// A physical device hosting extents. Index 0 is the super device itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub partition_name: String,
    /// First sector usable for extents; everything before holds metadata.
    pub first_logical_sector: u64,
    /// Extent start alignment in bytes.
    pub alignment: u64,
    /// Device size in bytes.
    pub size: u64,
}

impl BlockDevice {
    /// Last usable sector (exclusive).
    pub fn end_sector(&self) -> u64 {
        self.size / SECTOR_SIZE
    }

    pub fn allocatable_bytes(&self) -> u64 {
        self.size
            .saturating_sub(self.first_logical_sector.saturating_mul(SECTOR_SIZE))
    }
}

/// A named quota bucket. `maximum_size == 0` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub maximum_size: u64,
}

impl Group {
    pub fn is_unbounded(&self) -> bool {
        self.maximum_size == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub group_name: String,
    #[serde(default)]
    pub attributes: u32,
    #[serde(default)]
    pub extents: Vec<Extent>,
}

impl Partition {
    pub fn new(name: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_name: group_name.into(),
            attributes: 0,
            extents: Vec::new(),
        }
    }

    pub fn attribute_flags(&self) -> BitFlags<PartitionAttribute> {
        BitFlags::from_bits_truncate(self.attributes)
    }

    pub fn is_readonly(&self) -> bool {
        self.attribute_flags().contains(PartitionAttribute::Readonly)
    }

    pub fn num_sectors(&self) -> u64 {
        self.extents.iter().map(Extent::num_sectors).sum()
    }

    /// Logical size of the partition, zero extents included.
    pub fn bytes_on_disk(&self) -> u64 {
        self.num_sectors() * SECTOR_SIZE
    }

    /// Bytes actually backed by physical sectors.
    pub fn linear_bytes(&self) -> u64 {
        self.extents
            .iter()
            .filter(|extent| extent.is_linear())
            .map(Extent::num_sectors)
            .sum::<u64>()
            * SECTOR_SIZE
    }
}

/// Metadata document for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpMetadata {
    pub version: u32,
    pub logical_block_size: u32,
    pub block_devices: Vec<BlockDevice>,
    pub groups: Vec<Group>,
    pub partitions: Vec<Partition>,
}

impl LpMetadata {
    pub fn find_partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|partition| partition.name == name)
    }

    pub fn find_group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.name == name)
    }
}
