// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for lptools
//!
//! This crate defines the data shared between the metadata layer
//! (`lptools-sys`) and the command engine (`lptools`):
//!
//! - `Slot` / `SlotSuffix` → which metadata copy is being edited
//! - `LpMetadata` → block devices, groups, partitions and their extents
//! - `Extent` → linear (backed by physical sectors) or zero (placeholder)
//!
//! Everything here is plain data with `serde` derives; allocation and
//! persistence live in `lptools-sys`.

pub mod common;
pub mod metadata;
pub mod slot;

pub use common::{SECTOR_SIZE, align_up, bytes_to_pretty};
pub use metadata::{
    BlockDevice, Extent, Group, LpMetadata, METADATA_VERSION, Partition, PartitionAttribute,
};
pub use slot::{Slot, SlotSuffix};
