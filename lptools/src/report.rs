// SPDX-License-Identifier: GPL-3.0-only

//! Command outcomes, rendered as text or JSON by the CLI.

use std::fmt;
use std::path::PathBuf;

use lptools_types::{Extent, bytes_to_pretty};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    pub partition: String,
    pub group: String,
    pub size: u64,
    pub device: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub partition: String,
    pub existed: bool,
    pub unmapped: bool,
    /// Set when a mapped device could not be torn down before removal.
    pub teardown_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResizeReport {
    pub partition: String,
    pub old_size: u64,
    pub new_size: u64,
    /// Device path when the partition was mapped and has been remapped.
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub original: String,
    pub replacement: String,
    pub group: String,
    pub extents: Vec<Extent>,
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapReport {
    pub partition: String,
    pub device: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmapReport {
    pub partition: String,
    pub was_mapped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionUsage {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeSpaceReport {
    pub group: String,
    pub partitions: Vec<PartitionUsage>,
    pub free_space: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfoReport {
    pub group: String,
    pub used_space: u64,
    pub allocatable_space: u64,
    pub partitions: Vec<PartitionUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlimitedGroupReport {
    pub group: String,
    pub previous_maximum: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    pub partition: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearCowReport {
    pub removed: Vec<String>,
    pub reclaimed: u64,
    pub teardown_failures: Vec<TeardownFailure>,
}

/// Result of one lptools command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Outcome {
    Create(CreateReport),
    Remove(RemoveReport),
    Resize(ResizeReport),
    Replace(ReplaceReport),
    Map(MapReport),
    Unmap(UnmapReport),
    Free(FreeSpaceReport),
    GetInfo(GroupInfoReport),
    UnlimitedGroup(UnlimitedGroupReport),
    ClearCow(ClearCowReport),
}

impl Outcome {
    /// Non-fatal problems the caller should see on stderr.
    pub fn warnings(&self) -> Vec<String> {
        match self {
            Self::Remove(RemoveReport {
                partition,
                teardown_error: Some(error),
                ..
            }) => vec![format!("could not unmap {partition}: {error}")],
            Self::ClearCow(report) => report
                .teardown_failures
                .iter()
                .map(|f| format!("could not unmap {}: {}", f.partition, f.error))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(r) => {
                writeln!(
                    f,
                    "Created {} in group {} ({} bytes)",
                    r.partition, r.group, r.size
                )?;
                write!(f, "Mapped {} at {}", r.partition, r.device.display())
            }
            Self::Remove(r) if r.existed => write!(f, "Removed {}", r.partition),
            Self::Remove(r) => write!(f, "{} does not exist, nothing removed", r.partition),
            Self::Resize(r) => {
                write!(
                    f,
                    "Resized {} from {} to {} bytes",
                    r.partition, r.old_size, r.new_size
                )?;
                if let Some(device) = &r.device {
                    write!(f, "\nRemapped {} at {}", r.partition, device.display())?;
                }
                Ok(())
            }
            Self::Replace(r) => {
                write!(
                    f,
                    "Replaced {} with {} in group {} ({} extents)",
                    r.original,
                    r.replacement,
                    r.group,
                    r.extents.len()
                )?;
                if let Some(device) = &r.device {
                    write!(f, "\nRemapped {} at {}", r.replacement, device.display())?;
                }
                Ok(())
            }
            Self::Map(r) => write!(f, "Mapped {} at {}", r.partition, r.device.display()),
            Self::Unmap(r) if r.was_mapped => write!(f, "Unmapped {}", r.partition),
            Self::Unmap(r) => write!(f, "{} is not mapped", r.partition),
            Self::Free(r) => {
                for usage in &r.partitions {
                    writeln!(
                        f,
                        "{}:{}:{}",
                        usage.name,
                        usage.size,
                        bytes_to_pretty(usage.size)
                    )?;
                }
                write!(f, "Free space: {}", r.free_space)
            }
            Self::GetInfo(r) => {
                write!(
                    f,
                    "GroupInSuper->{} Usage->{} TotalSpace->{}",
                    r.group, r.used_space, r.allocatable_space
                )?;
                for usage in &r.partitions {
                    write!(
                        f,
                        "\nNamePartInGroup->{} Size->{}",
                        usage.name, usage.size
                    )?;
                }
                Ok(())
            }
            Self::UnlimitedGroup(r) => write!(
                f,
                "Group {} is now unlimited (was {} bytes)",
                r.group, r.previous_maximum
            ),
            Self::ClearCow(r) => {
                for name in &r.removed {
                    writeln!(f, "Deleted {name}")?;
                }
                write!(
                    f,
                    "Removed {} COW partitions ({})",
                    r.removed.len(),
                    bytes_to_pretty(r.reclaimed)
                )
            }
        }
    }
}
