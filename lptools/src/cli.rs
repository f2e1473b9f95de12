// SPDX-License-Identifier: GPL-3.0-only

//! Command-line surface: global context flags plus exactly one command flag.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser};
use lptools_types::{Slot, SlotSuffix};

use crate::context::ContextArgs;
use crate::engine::Operation;
use crate::error::{LpError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "lptools",
    version,
    about = "Create, resize, map and remove dynamic partitions in a super device"
)]
pub struct Cli {
    /// Metadata slot to edit
    #[arg(long, value_name = "0|1", value_parser = slot_arg)]
    pub slot: Option<Slot>,

    /// Slot suffix (_a, a, 0, _b, b or 1)
    #[arg(long, value_name = "SUFFIX", value_parser = suffix_arg)]
    pub suffix: Option<SlotSuffix>,

    /// Super device or image holding the metadata
    #[arg(long = "super", value_name = "PATH")]
    pub super_path: Option<PathBuf>,

    /// Group to operate on (default: the group of system<suffix>)
    #[arg(long, value_name = "GROUP", value_parser = group_arg)]
    pub group: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub command: CommandArgs,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct CommandArgs {
    /// Create a partition of SIZE bytes in the group and map it
    #[arg(long, num_args = 2, value_names = ["NAME", "SIZE"], allow_negative_numbers = true)]
    pub create: Option<Vec<String>>,

    /// Unmap and remove a partition
    #[arg(long, value_name = "NAME")]
    pub remove: Option<String>,

    /// Resize a partition to SIZE bytes, remapping it if it was mapped
    #[arg(long, num_args = 2, value_names = ["NAME", "SIZE"], allow_negative_numbers = true)]
    pub resize: Option<Vec<String>>,

    /// Move the extents of ORIGINAL to a new partition named NEW
    #[arg(long, num_args = 2, value_names = ["ORIGINAL", "NEW"])]
    pub replace: Option<Vec<String>>,

    /// Map a partition
    #[arg(long, value_name = "NAME")]
    pub map: Option<String>,

    /// Unmap a partition
    #[arg(long, value_name = "NAME")]
    pub unmap: Option<String>,

    /// Show free space in the group
    #[arg(long)]
    pub free: bool,

    /// Show the partitions of the group and volume usage
    #[arg(long)]
    pub get_info: bool,

    /// Remove the size limit of the group
    #[arg(long)]
    pub unlimited_group: bool,

    /// Remove snapshot COW partitions when no merge is pending
    #[arg(long)]
    pub clear_cow: bool,
}

impl Cli {
    pub fn context_args(&self) -> ContextArgs {
        ContextArgs {
            slot: self.slot,
            suffix: self.suffix,
            super_path: self.super_path.clone(),
            group: self.group.clone(),
        }
    }
}

impl CommandArgs {
    pub fn operation(&self) -> Result<Operation> {
        if let Some([name, size]) = pair(&self.create) {
            return Ok(Operation::Create {
                name: name.clone(),
                size: parse_size(size)?,
            });
        }
        if let Some(name) = &self.remove {
            return Ok(Operation::Remove { name: name.clone() });
        }
        if let Some([name, size]) = pair(&self.resize) {
            return Ok(Operation::Resize {
                name: name.clone(),
                size: parse_size(size)?,
            });
        }
        if let Some([original, replacement]) = pair(&self.replace) {
            return Ok(Operation::Replace {
                original: original.clone(),
                replacement: replacement.clone(),
            });
        }
        if let Some(name) = &self.map {
            return Ok(Operation::Map { name: name.clone() });
        }
        if let Some(name) = &self.unmap {
            return Ok(Operation::Unmap { name: name.clone() });
        }
        if self.free {
            return Ok(Operation::Free);
        }
        if self.get_info {
            return Ok(Operation::GetInfo);
        }
        if self.unlimited_group {
            return Ok(Operation::UnlimitedGroup);
        }
        if self.clear_cow {
            return Ok(Operation::ClearCow);
        }
        Err(LpError::InvalidArgument("no command given".to_string()))
    }
}

fn slot_arg(value: &str) -> std::result::Result<Slot, String> {
    Slot::parse(value).ok_or_else(|| "expected 0 or 1".to_string())
}

fn suffix_arg(value: &str) -> std::result::Result<SlotSuffix, String> {
    SlotSuffix::parse(value).ok_or_else(|| "expected _a, a, 0, _b, b or 1".to_string())
}

fn group_arg(value: &str) -> std::result::Result<String, String> {
    if value.is_empty() || value.starts_with("--") {
        return Err("expected a group name".to_string());
    }
    Ok(value.to_string())
}

fn pair(values: &Option<Vec<String>>) -> Option<&[String; 2]> {
    values.as_deref().and_then(|values| values.try_into().ok())
}

/// Parse a size in bytes. Accepts decimal, `0x` hexadecimal and
/// leading-zero octal; negative sizes are rejected.
pub fn parse_size(value: &str) -> Result<u64> {
    let invalid = || LpError::InvalidArgument(format!("invalid size '{value}'"));

    let trimmed = value.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = u64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    if magnitude > i64::MAX as u64 {
        return Err(LpError::InvalidArgument(format!("size '{value}' is out of range")));
    }
    if negative && magnitude != 0 {
        return Err(LpError::InvalidArgument(
            "the size of a partition must be zero or greater".to_string(),
        ));
    }
    Ok(magnitude)
}
