// SPDX-License-Identifier: GPL-3.0-only

//! Super device metadata layout
//!
//! ```text
//! 0             4096           8192
//! | reserved    | geometry    | primary slot 0 .. n | backup slot 0 .. n | extents ...
//! ```
//!
//! Every record is framed as a 4-byte magic, a little-endian `u32` payload
//! length and a JSON payload. Writes go to the primary copy first, then the
//! backup, each followed by a sync. A torn primary write leaves the previous
//! table readable from the backup.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use lptools_types::{BlockDevice, Group, LpMetadata, SECTOR_SIZE, Slot, align_up};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SysError};
use crate::table::{MetadataBuilder, MetadataStore};

pub const RESERVED_BYTES: u64 = 4096;
pub const GEOMETRY_BYTES: u64 = 4096;
pub const DEFAULT_METADATA_MAX_SIZE: u64 = 64 * 1024;
/// Largest metadata area a geometry may declare.
pub const METADATA_MAX_SIZE_LIMIT: u64 = 1024 * 1024;
pub const DEFAULT_LOGICAL_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_ALIGNMENT: u64 = 1024 * 1024;

const GEOMETRY_MAGIC: [u8; 4] = *b"LPTG";
const METADATA_MAGIC: [u8; 4] = *b"LPTM";
const FRAME_HEADER: usize = 8;

/// Fixed layout parameters stored once per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub metadata_max_size: u64,
    pub metadata_slot_count: u32,
    pub logical_block_size: u32,
}

impl Geometry {
    fn validate(&self) -> Result<()> {
        if self.metadata_slot_count == 0
            || self.metadata_max_size == 0
            || self.metadata_max_size > METADATA_MAX_SIZE_LIMIT
        {
            return Err(SysError::InvalidMetadata(format!(
                "unusable geometry: {} slots of {} bytes",
                self.metadata_slot_count, self.metadata_max_size
            )));
        }
        Ok(())
    }

    fn areas_start() -> u64 {
        RESERVED_BYTES + GEOMETRY_BYTES
    }

    fn check_slot(&self, slot: Slot) -> Result<()> {
        if slot.number() >= self.metadata_slot_count {
            return Err(SysError::SlotOutOfRange(slot));
        }
        Ok(())
    }

    pub fn primary_offset(&self, slot: Slot) -> u64 {
        Self::areas_start() + u64::from(slot.number()) * self.metadata_max_size
    }

    pub fn backup_offset(&self, slot: Slot) -> u64 {
        Self::areas_start()
            + u64::from(self.metadata_slot_count + slot.number()) * self.metadata_max_size
    }

    /// First byte after all metadata areas.
    pub fn metadata_end(&self) -> u64 {
        Self::areas_start() + 2 * u64::from(self.metadata_slot_count) * self.metadata_max_size
    }
}

/// Parameters for laying out a fresh super device.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Size to give a regular image file. Block devices keep their size.
    pub device_size: Option<u64>,
    pub metadata_max_size: u64,
    pub metadata_slot_count: u32,
    pub logical_block_size: u32,
    pub alignment: u64,
    /// Groups created next to the default group.
    pub groups: Vec<Group>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            device_size: None,
            metadata_max_size: DEFAULT_METADATA_MAX_SIZE,
            metadata_slot_count: 2,
            logical_block_size: DEFAULT_LOGICAL_BLOCK_SIZE,
            alignment: DEFAULT_ALIGNMENT,
            groups: Vec::new(),
        }
    }
}

fn encode_frame(magic: [u8; 4], payload: &[u8], capacity: u64) -> Result<Vec<u8>> {
    let size = (payload.len() + FRAME_HEADER) as u64;
    if size > capacity || payload.len() > u32::MAX as usize {
        return Err(SysError::MetadataTooLarge { size, capacity });
    }
    let mut frame = Vec::with_capacity(payload.len() + FRAME_HEADER);
    frame.extend_from_slice(&magic);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn decode_frame(magic: [u8; 4], area: &[u8]) -> Result<&[u8]> {
    if area.len() < FRAME_HEADER || area[..4] != magic {
        return Err(SysError::InvalidMetadata(format!(
            "missing {} record",
            String::from_utf8_lossy(&magic)
        )));
    }
    let len = u32::from_le_bytes([area[4], area[5], area[6], area[7]]) as usize;
    area.get(FRAME_HEADER..FRAME_HEADER + len).ok_or_else(|| {
        SysError::InvalidMetadata(format!("record length {len} overruns its area"))
    })
}

/// An opened super device (block device or image file).
pub struct SuperDevice {
    path: PathBuf,
    file: File,
    geometry: Geometry,
}

impl SuperDevice {
    fn open_file(path: &Path, writable: bool) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SysError::DeviceNotFound(path.display().to_string())
                } else {
                    SysError::Io(e)
                }
            })
    }

    fn from_file(path: &Path, file: File) -> Result<Self> {
        let mut area = vec![0u8; GEOMETRY_BYTES as usize];
        file.read_exact_at(&mut area, RESERVED_BYTES)?;
        let geometry: Geometry = serde_json::from_slice(decode_frame(GEOMETRY_MAGIC, &area)?)?;
        geometry.validate()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            geometry,
        })
    }

    /// Open read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = Self::open_file(path, false)?;
        Self::from_file(path, file)
    }

    /// Open for metadata writes.
    pub fn open_writable(path: &Path) -> Result<Self> {
        let file = Self::open_file(path, true)?;
        Self::from_file(path, file)
    }

    /// Lay out geometry and an empty table in every slot.
    ///
    /// Only the metadata areas are written; the extent area is left as is.
    pub fn format(path: &Path, options: &FormatOptions) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.device_size.is_some())
            .truncate(false)
            .open(path)?;
        if let Some(size) = options.device_size {
            file.set_len(size)?;
        }
        let size = file.seek(SeekFrom::End(0))?;

        let geometry = Geometry {
            metadata_max_size: options.metadata_max_size,
            metadata_slot_count: options.metadata_slot_count,
            logical_block_size: options.logical_block_size,
        };
        geometry.validate()?;
        let first_logical_sector = align_up(geometry.metadata_end(), options.alignment) / SECTOR_SIZE;
        if first_logical_sector * SECTOR_SIZE >= size {
            return Err(SysError::InvalidMetadata(format!(
                "{} bytes is too small for the metadata areas",
                size
            )));
        }

        let frame = encode_frame(GEOMETRY_MAGIC, &serde_json::to_vec(&geometry)?, GEOMETRY_BYTES)?;
        file.write_all_at(&frame, RESERVED_BYTES)?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "super".to_string());
        let mut builder = MetadataBuilder::new(
            vec![BlockDevice {
                partition_name: name,
                first_logical_sector,
                alignment: options.alignment,
                size,
            }],
            options.logical_block_size,
        );
        for group in &options.groups {
            builder.add_group(&group.name, group.maximum_size)?;
        }

        let mut device = Self {
            path: path.to_path_buf(),
            file,
            geometry,
        };
        let metadata = builder.export();
        for slot in (0..geometry.metadata_slot_count).filter_map(Slot::new) {
            device.write_metadata(slot, &metadata)?;
        }
        debug!(
            "formatted {} ({} bytes, extents from sector {})",
            path.display(),
            size,
            first_logical_sector
        );
        Ok(device)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn read_area(&self, offset: u64) -> Result<LpMetadata> {
        let mut area = vec![0u8; self.geometry.metadata_max_size as usize];
        self.file.read_exact_at(&mut area, offset)?;
        let metadata = serde_json::from_slice(decode_frame(METADATA_MAGIC, &area)?)?;
        Ok(metadata)
    }

    /// Read the table for `slot`, falling back to the backup copy.
    pub fn read_metadata(&self, slot: Slot) -> Result<LpMetadata> {
        self.geometry.check_slot(slot)?;
        match self.read_area(self.geometry.primary_offset(slot)) {
            Ok(metadata) => Ok(metadata),
            Err(primary) => {
                warn!(
                    "primary metadata for slot {} on {} is unreadable ({}), trying backup",
                    slot,
                    self.path.display(),
                    primary
                );
                self.read_area(self.geometry.backup_offset(slot))
                    .map_err(|_| primary)
            }
        }
    }

    /// Write the table for `slot`: primary first, then backup.
    ///
    /// The commit is complete once the primary is synced. A failed backup
    /// write after that is logged but not returned.
    pub fn write_metadata(&mut self, slot: Slot, metadata: &LpMetadata) -> Result<()> {
        self.geometry.check_slot(slot)?;
        let frame = encode_frame(
            METADATA_MAGIC,
            &serde_json::to_vec(metadata)?,
            self.geometry.metadata_max_size,
        )?;

        self.file
            .write_all_at(&frame, self.geometry.primary_offset(slot))?;
        self.file.sync_data()?;

        let backup = self
            .file
            .write_all_at(&frame, self.geometry.backup_offset(slot))
            .and_then(|()| self.file.sync_data());
        if let Err(e) = backup {
            warn!(
                "backup metadata for slot {} on {} was not updated: {}",
                slot,
                self.path.display(),
                e
            );
        }
        Ok(())
    }
}

/// [`MetadataStore`] backed by a super device path.
#[derive(Debug, Clone)]
pub struct SuperDeviceStore {
    path: PathBuf,
}

impl SuperDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetadataStore for SuperDeviceStore {
    fn load(&self, slot: Slot) -> Result<LpMetadata> {
        SuperDevice::open(&self.path)?.read_metadata(slot)
    }

    fn commit(&self, metadata: &LpMetadata, slot: Slot) -> Result<()> {
        // Reject anything the builder would not load back.
        MetadataBuilder::from_metadata(metadata.clone())?;
        SuperDevice::open_writable(&self.path)?.write_metadata(slot, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lptools_types::Extent;

    const MIB: u64 = 1024 * 1024;

    fn scratch_image(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "lptools-device-{}-{}.img",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn format_image(path: &Path) -> SuperDevice {
        SuperDevice::format(
            path,
            &FormatOptions {
                device_size: Some(16 * MIB),
                groups: vec![Group {
                    name: "main".to_string(),
                    maximum_size: 8 * MIB,
                }],
                ..FormatOptions::default()
            },
        )
        .expect("format image")
    }

    #[test]
    fn format_writes_empty_table_to_every_slot() {
        let path = scratch_image("format");
        format_image(&path);

        let device = SuperDevice::open(&path).expect("open image");
        for slot in [Slot::ZERO, Slot::ONE] {
            let metadata = device.read_metadata(slot).expect("read slot");
            assert!(metadata.partitions.is_empty());
            assert!(metadata.find_group("main").is_some());
            assert_eq!(metadata.block_devices[0].size, 16 * MIB);
            assert_eq!(metadata.block_devices[0].first_logical_sector, 2048);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn store_commit_is_visible_only_in_its_slot() {
        let path = scratch_image("commit");
        format_image(&path);
        let store = SuperDeviceStore::new(&path);

        let mut metadata = store.load(Slot::ONE).expect("load slot 1");
        let mut partition = lptools_types::Partition::new("system_b", "main");
        partition.extents.push(Extent::linear(2048, 0, 2048));
        metadata.partitions.push(partition);
        store.commit(&metadata, Slot::ONE).expect("commit");

        assert!(
            store
                .load(Slot::ONE)
                .expect("reload slot 1")
                .find_partition("system_b")
                .is_some()
        );
        assert!(
            store
                .load(Slot::ZERO)
                .expect("reload slot 0")
                .partitions
                .is_empty()
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_primary_falls_back_to_backup() {
        let path = scratch_image("backup");
        let device = format_image(&path);
        let offset = device.geometry().primary_offset(Slot::ZERO);
        drop(device);

        let file = OpenOptions::new().write(true).open(&path).expect("open");
        file.write_all_at(b"junk", offset).expect("clobber primary");

        let metadata = SuperDevice::open(&path)
            .expect("open image")
            .read_metadata(Slot::ZERO)
            .expect("read from backup");
        assert!(metadata.find_group("main").is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn torn_primary_write_keeps_previous_table() {
        let path = scratch_image("torn");
        format_image(&path);
        let mut device = SuperDevice::open_writable(&path).expect("reopen");
        let offset = device.geometry().primary_offset(Slot::ZERO);

        let mut metadata = device.read_metadata(Slot::ZERO).expect("read");
        let mut partition = lptools_types::Partition::new("system", "main");
        partition.extents.push(Extent::linear(2048, 0, 2048));
        metadata.partitions.push(partition);
        let payload = serde_json::to_vec(&metadata).expect("encode");
        let frame = encode_frame(METADATA_MAGIC, &payload, DEFAULT_METADATA_MAX_SIZE)
            .expect("frame");

        // Interrupted halfway through the primary, before the backup.
        device
            .file
            .write_all_at(&frame[..frame.len() / 2], offset)
            .expect("partial write");
        let reread = device.read_metadata(Slot::ZERO).expect("read backup");
        assert!(reread.partitions.is_empty());

        device.write_metadata(Slot::ZERO, &metadata).expect("full write");
        let backup = device
            .read_area(device.geometry().backup_offset(Slot::ZERO))
            .expect("read backup area");
        assert_eq!(backup, metadata);
        assert_eq!(device.read_metadata(Slot::ZERO).expect("read"), metadata);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn oversized_geometry_is_rejected() {
        let path = scratch_image("geometry");
        format_image(&path);

        let geometry = Geometry {
            metadata_max_size: u64::MAX / 4,
            metadata_slot_count: 2,
            logical_block_size: DEFAULT_LOGICAL_BLOCK_SIZE,
        };
        let frame = encode_frame(
            GEOMETRY_MAGIC,
            &serde_json::to_vec(&geometry).expect("encode"),
            GEOMETRY_BYTES,
        )
        .expect("frame");
        let file = OpenOptions::new().write(true).open(&path).expect("open");
        file.write_all_at(&frame, RESERVED_BYTES).expect("write geometry");

        assert!(matches!(
            SuperDevice::open(&path),
            Err(SysError::InvalidMetadata(_))
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn oversized_metadata_is_rejected() {
        let err = encode_frame(METADATA_MAGIC, &[0u8; 64], 32).expect_err("too large");
        assert!(matches!(err, SysError::MetadataTooLarge { .. }));
    }

    #[test]
    fn slot_outside_geometry_is_rejected() {
        let path = scratch_image("slots");
        let device = SuperDevice::format(
            &path,
            &FormatOptions {
                device_size: Some(4 * MIB),
                metadata_slot_count: 1,
                ..FormatOptions::default()
            },
        )
        .expect("format image");

        assert!(device.read_metadata(Slot::ZERO).is_ok());
        assert!(matches!(
            device.read_metadata(Slot::ONE),
            Err(SysError::SlotOutOfRange(_))
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn opening_missing_device_reports_path() {
        let err = SuperDevice::open(Path::new("/nonexistent/lptools/super")).err();
        assert!(matches!(err, Some(SysError::DeviceNotFound(_))));
    }
}
