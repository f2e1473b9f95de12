// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use lptools_sys::{MergeStatus, SysError, TableError};
use thiserror::Error;

/// Failures reported by lptools commands.
///
/// Every error ends the invocation; nothing is retried.
#[derive(Error, Debug)]
pub enum LpError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The specified path for --super does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("The specified path for --super is a directory: {}", .0.display())]
    PathIsDirectory(PathBuf),

    #[error("Specified group does not exist: {0}")]
    UnknownGroup(String),

    #[error("No group given and no partition named '{searched}' to take one from")]
    GroupNotResolved { searched: String },

    #[error("Partition does not exist: {0}")]
    NotFound(String),

    #[error("Partition already exists: {0}")]
    AlreadyExists(String),

    #[error("Not enough space to make {partition} {requested} bytes")]
    OutOfSpace { partition: String, requested: u64 },

    #[error("Failed to write partition table: {0}")]
    CommitFailed(SysError),

    #[error("Failed to map {partition}: {source}")]
    MapFailed { partition: String, source: SysError },

    #[error("Failed to unmap {partition}: {source}")]
    UnmapFailed { partition: String, source: SysError },

    #[error("Snapshot merge status is '{0}', refusing to remove COW partitions")]
    MergeInProgress(MergeStatus),

    #[error("Failed to load partition table from {}: {source}", path.display())]
    LoadFailed { path: PathBuf, source: SysError },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Table(TableError),
}

impl LpError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl From<TableError> for LpError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::AlreadyExists(name) => Self::AlreadyExists(name),
            TableError::PartitionNotFound(name) => Self::NotFound(name),
            TableError::GroupNotFound(group) => Self::UnknownGroup(group),
            TableError::InsufficientSpace {
                partition,
                requested,
            } => Self::OutOfSpace {
                partition,
                requested,
            },
            other => Self::Table(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LpError>;
