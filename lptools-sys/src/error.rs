// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use lptools_types::Slot;
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Metadata is {size} bytes but a slot holds at most {capacity} bytes")]
    MetadataTooLarge { size: u64, capacity: u64 },

    #[error("Slot {0} is not present in the metadata geometry")]
    SlotOutOfRange(Slot),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Timed out after {}ms waiting for {what}", timeout.as_millis())]
    Timeout { what: String, timeout: Duration },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Failures reported by the in-memory partition table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Partition already exists: {0}")]
    AlreadyExists(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group already exists: {0}")]
    GroupExists(String),

    #[error("Not enough space to resize {partition} to {requested} bytes")]
    InsufficientSpace { partition: String, requested: u64 },

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
