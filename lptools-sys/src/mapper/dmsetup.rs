// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};
use std::time::Duration;

use lptools_types::{Extent, LpMetadata, Partition};
use tracing::{debug, info};

use super::{ActivateRequest, DeviceState, LogicalMapper, wait_for};
use crate::cmd::{run_command, run_command_with_input};
use crate::device::SuperDevice;
use crate::{Result, SysError};

pub const DEFAULT_MAPPER_DIR: &str = "/dev/mapper";
pub const DEFAULT_BLOCK_DEVICE_DIR: &str = "/dev/block/by-name";

/// Device-mapper access through the `dmsetup` tool.
#[derive(Debug, Clone)]
pub struct DmsetupMapper {
    binary: PathBuf,
    mapper_dir: PathBuf,
    block_device_dir: PathBuf,
}

impl DmsetupMapper {
    pub fn new(binary: PathBuf, mapper_dir: PathBuf, block_device_dir: PathBuf) -> Self {
        Self {
            binary,
            mapper_dir,
            block_device_dir,
        }
    }

    /// Use `dmsetup` from PATH when present.
    pub fn locate(mapper_dir: PathBuf, block_device_dir: PathBuf) -> Self {
        let binary = which::which("dmsetup").unwrap_or_else(|_| PathBuf::from("dmsetup"));
        Self::new(binary, mapper_dir, block_device_dir)
    }

    pub fn device_path(&self, name: &str) -> PathBuf {
        self.mapper_dir.join(name)
    }
}

/// Parse the `attr` column of `dmsetup info`, e.g. `L--w` or `L-sw`.
///
/// Any existing device counts as mapped, including one created with
/// `--notable` (`---w`) or holding only an inactive table (`-I-w`).
fn parse_attr(attr: &str) -> DeviceState {
    let attr = attr.trim();
    if attr.is_empty() {
        DeviceState::Inactive
    } else if attr.chars().nth(2) == Some('s') {
        DeviceState::Suspended
    } else {
        DeviceState::Active
    }
}

/// Build a device-mapper table for `partition`, one target per extent.
///
/// Device index 0 maps to `super_path`; other devices are looked up by
/// name under `block_device_dir`.
pub fn build_dm_table(
    metadata: &LpMetadata,
    partition: &Partition,
    super_path: &Path,
    block_device_dir: &Path,
) -> Result<String> {
    let mut lines = Vec::with_capacity(partition.extents.len());
    let mut logical_sector = 0;

    for extent in &partition.extents {
        let line = match extent {
            Extent::Linear {
                num_sectors,
                device_index,
                physical_sector,
            } => {
                let device = if *device_index == 0 {
                    super_path.to_path_buf()
                } else {
                    let entry = metadata
                        .block_devices
                        .get(*device_index as usize)
                        .ok_or_else(|| {
                            SysError::InvalidMetadata(format!(
                                "{} references block device {device_index}",
                                partition.name
                            ))
                        })?;
                    block_device_dir.join(&entry.partition_name)
                };
                format!(
                    "{logical_sector} {num_sectors} linear {} {physical_sector}",
                    device.display()
                )
            }
            Extent::Zero { num_sectors } => format!("{logical_sector} {num_sectors} zero"),
        };
        logical_sector += extent.num_sectors();
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

impl LogicalMapper for DmsetupMapper {
    fn state(&self, name: &str) -> DeviceState {
        match run_command(
            &self.binary,
            &["info", "-c", "--noheadings", "-o", "attr", name],
        ) {
            Ok(output) => parse_attr(&output),
            Err(e) => {
                debug!("dmsetup info {name}: {e}");
                DeviceState::Inactive
            }
        }
    }

    fn activate(&self, request: &ActivateRequest<'_>) -> Result<PathBuf> {
        let name = request.partition_name;
        let metadata = SuperDevice::open(request.super_path)?.read_metadata(request.slot)?;
        let partition = metadata.find_partition(name).ok_or_else(|| {
            SysError::DeviceNotFound(format!(
                "{name} is not in slot {} metadata of {}",
                request.slot,
                request.super_path.display()
            ))
        })?;

        let mut args = vec!["create", name];
        if partition.is_readonly() && !request.force_writable {
            args.push("--readonly");
        }

        if partition.extents.is_empty() {
            args.push("--notable");
            run_command(&self.binary, &args)?;
        } else {
            let table =
                build_dm_table(&metadata, partition, request.super_path, &self.block_device_dir)?;
            debug!("dm table for {name}:\n{table}");
            run_command_with_input(&self.binary, &args, &table)?;
        }

        let path = self.device_path(name);
        wait_for(&path.display().to_string(), request.timeout, || path.exists())?;
        info!("Mapped {name} at {}", path.display());
        Ok(path)
    }

    fn deactivate(&self, name: &str, timeout: Duration) -> Result<()> {
        run_command(&self.binary, &["remove", name])?;
        let path = self.device_path(name);
        wait_for(&format!("removal of {}", path.display()), timeout, || {
            !path.exists()
        })?;
        info!("Unmapped {name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lptools_types::{BlockDevice, Group, METADATA_VERSION};

    fn metadata() -> LpMetadata {
        LpMetadata {
            version: METADATA_VERSION,
            logical_block_size: 4096,
            block_devices: vec![
                BlockDevice {
                    partition_name: "super".to_string(),
                    first_logical_sector: 2048,
                    alignment: 1024 * 1024,
                    size: 64 * 1024 * 1024,
                },
                BlockDevice {
                    partition_name: "system_ext".to_string(),
                    first_logical_sector: 0,
                    alignment: 1024 * 1024,
                    size: 64 * 1024 * 1024,
                },
            ],
            groups: vec![Group {
                name: "main".to_string(),
                maximum_size: 0,
            }],
            partitions: Vec::new(),
        }
    }

    #[test]
    fn table_lists_extents_in_logical_order() {
        let mut partition = Partition::new("product_a", "main");
        partition.extents = vec![
            Extent::linear(2048, 0, 4096),
            Extent::zero(8),
            Extent::linear(16, 1, 0),
        ];

        let table = build_dm_table(
            &metadata(),
            &partition,
            Path::new("/dev/block/by-name/super"),
            Path::new("/dev/block/by-name"),
        )
        .expect("build table");

        assert_eq!(
            table,
            "0 2048 linear /dev/block/by-name/super 4096\n\
             2048 8 zero\n\
             2056 16 linear /dev/block/by-name/system_ext 0"
        );
    }

    #[test]
    fn table_rejects_unknown_device() {
        let mut partition = Partition::new("odm_a", "main");
        partition.extents = vec![Extent::linear(8, 5, 0)];
        let err = build_dm_table(
            &metadata(),
            &partition,
            Path::new("/tmp/super.img"),
            Path::new("/dev/block/by-name"),
        )
        .expect_err("device 5 is missing");
        assert!(matches!(err, SysError::InvalidMetadata(_)));
    }

    #[test]
    fn attr_column_maps_to_state() {
        assert_eq!(parse_attr("L--w\n"), DeviceState::Active);
        assert_eq!(parse_attr("L-sw"), DeviceState::Suspended);
    }

    #[test]
    fn tableless_devices_still_count_as_mapped() {
        assert_eq!(parse_attr("---w"), DeviceState::Active);
        assert_eq!(parse_attr("-I-w"), DeviceState::Active);
        assert_eq!(parse_attr("--sw"), DeviceState::Suspended);
        assert_eq!(parse_attr(""), DeviceState::Inactive);
    }

    #[test]
    fn missing_dmsetup_reports_inactive() {
        let mapper = DmsetupMapper::new(
            PathBuf::from("/nonexistent/dmsetup"),
            PathBuf::from(DEFAULT_MAPPER_DIR),
            PathBuf::from(DEFAULT_BLOCK_DEVICE_DIR),
        );
        assert_eq!(mapper.state("system_a"), DeviceState::Inactive);
    }
}
