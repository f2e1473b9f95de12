// SPDX-License-Identifier: GPL-3.0-only

//! Low-level operations on dynamic partition metadata
//!
//! This crate provides the capabilities the lptools command engine is
//! written against, together with their system-backed implementations:
//! - `PartitionTable`: the in-memory table for one slot, committed through a
//!   `MetadataStore` (`SuperDeviceStore` reads and writes the super device)
//! - `LogicalMapper`: device-mapper activation (`DmsetupMapper`)
//! - `MergeStatusGate`: the snapshot merge safety check (`bootctl`)
//! - system property lookup (`getprop`)
//!
//! Device-mapper and super device writes require elevated privileges.

pub mod cmd;
pub mod device;
pub mod error;
pub mod mapper;
pub mod merge;
pub mod property;
pub mod table;

pub use device::{FormatOptions, Geometry, SuperDevice, SuperDeviceStore};
pub use error::{Result, SysError, TableError};
pub use mapper::{ActivateRequest, DeviceState, DmsetupMapper, LogicalMapper};
#[cfg(feature = "bootctl")]
pub use merge::BootctlMergeGate;
pub use merge::{MergeStatus, MergeStatusGate, NoMergeGate};
pub use property::get_property;
#[cfg(any(test, feature = "test-support"))]
pub use table::MemoryStore;
pub use table::{MetadataBuilder, MetadataStore, PartitionTable, SuperTable};
