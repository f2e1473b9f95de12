// SPDX-License-Identifier: GPL-3.0-only

//! Partition table capability.
//!
//! A [`SuperTable`] is the in-memory table for one slot. It is loaded from a
//! [`MetadataStore`], mutated through [`PartitionTable`], and handed back to
//! the store by [`PartitionTable::commit`], which consumes it: a table cannot
//! be touched again after a commit attempt, whatever the outcome.

mod builder;
#[cfg(any(test, feature = "test-support"))]
mod memory;

pub use builder::{DEFAULT_GROUP, MetadataBuilder};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

use enumflags2::BitFlags;
use lptools_types::{Extent, Group, LpMetadata, Partition, PartitionAttribute, Slot};
use tracing::{debug, info};

use crate::Result;
use crate::error::TableError;

/// Persistent home of the per-slot metadata.
pub trait MetadataStore {
    fn load(&self, slot: Slot) -> Result<LpMetadata>;

    /// Write `metadata` for `slot`. Either the whole document lands or the
    /// previous one stays readable.
    fn commit(&self, metadata: &LpMetadata, slot: Slot) -> Result<()>;
}

pub trait PartitionTable {
    fn list_groups(&self) -> Vec<&str>;

    fn list_partitions_in_group(&self, group: &str) -> Vec<&Partition>;

    fn find_partition(&self, name: &str) -> Option<&Partition>;

    fn find_group(&self, name: &str) -> Option<&Group>;

    /// Add an empty partition to `group`.
    fn add_partition(
        &mut self,
        name: &str,
        group: &str,
        attributes: BitFlags<PartitionAttribute>,
    ) -> std::result::Result<(), TableError>;

    /// Remove a partition and free its extents. Absent names are ignored.
    fn remove_partition(&mut self, name: &str);

    /// Grow or shrink a partition to `size` bytes (rounded up to the logical
    /// block size).
    fn resize_partition(&mut self, name: &str, size: u64) -> std::result::Result<(), TableError>;

    /// Append an extent to the end of a partition.
    fn add_extent(&mut self, name: &str, extent: Extent) -> std::result::Result<(), TableError>;

    fn change_group_size(
        &mut self,
        group: &str,
        maximum_size: u64,
    ) -> std::result::Result<(), TableError>;

    /// Total bytes that may hold extents across all block devices.
    fn allocatable_space(&self) -> u64;

    /// Bytes currently backed by linear extents.
    fn used_space(&self) -> u64;

    /// Write the table back, consuming it.
    fn commit(self) -> Result<()>
    where
        Self: Sized;
}

/// Table for one slot bound to the store it was loaded from.
pub struct SuperTable<S: MetadataStore> {
    builder: MetadataBuilder,
    store: S,
    slot: Slot,
}

impl<S: MetadataStore> SuperTable<S> {
    pub fn load(store: S, slot: Slot) -> Result<Self> {
        let metadata = store.load(slot)?;
        debug!(
            "loaded slot {} metadata: {} groups, {} partitions",
            slot,
            metadata.groups.len(),
            metadata.partitions.len()
        );
        let builder = MetadataBuilder::from_metadata(metadata)?;
        Ok(Self {
            builder,
            store,
            slot,
        })
    }
}

impl<S: MetadataStore> PartitionTable for SuperTable<S> {
    fn list_groups(&self) -> Vec<&str> {
        self.builder.list_groups()
    }

    fn list_partitions_in_group(&self, group: &str) -> Vec<&Partition> {
        self.builder.list_partitions_in_group(group)
    }

    fn find_partition(&self, name: &str) -> Option<&Partition> {
        self.builder.find_partition(name)
    }

    fn find_group(&self, name: &str) -> Option<&Group> {
        self.builder.find_group(name)
    }

    fn add_partition(
        &mut self,
        name: &str,
        group: &str,
        attributes: BitFlags<PartitionAttribute>,
    ) -> std::result::Result<(), TableError> {
        self.builder.add_partition(name, group, attributes)
    }

    fn remove_partition(&mut self, name: &str) {
        self.builder.remove_partition(name);
    }

    fn resize_partition(&mut self, name: &str, size: u64) -> std::result::Result<(), TableError> {
        self.builder.resize_partition(name, size)
    }

    fn add_extent(&mut self, name: &str, extent: Extent) -> std::result::Result<(), TableError> {
        self.builder.add_extent(name, extent)
    }

    fn change_group_size(
        &mut self,
        group: &str,
        maximum_size: u64,
    ) -> std::result::Result<(), TableError> {
        self.builder.change_group_size(group, maximum_size)
    }

    fn allocatable_space(&self) -> u64 {
        self.builder.allocatable_space()
    }

    fn used_space(&self) -> u64 {
        self.builder.used_space()
    }

    fn commit(self) -> Result<()> {
        let metadata = self.builder.export();
        self.store.commit(&metadata, self.slot)?;
        info!("Wrote partition table for slot {}", self.slot);
        Ok(())
    }
}
