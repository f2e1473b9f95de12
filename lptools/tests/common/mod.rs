// SPDX-License-Identifier: GPL-3.0-only

//! Fixtures shared by the engine tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use lptools::Context;
use lptools_sys::{
    ActivateRequest, DeviceState, LogicalMapper, MemoryStore, MergeStatus, MergeStatusGate,
    SuperTable, SysError,
};
use lptools_types::{
    BlockDevice, Extent, Group, LpMetadata, METADATA_VERSION, Partition, Slot, SlotSuffix,
};

pub const MIB: u64 = 1024 * 1024;
pub const TIMEOUT: Duration = Duration::from_secs(1);

/// A super device whose allocatable area is `allocatable` bytes.
pub fn super_device(allocatable: u64) -> BlockDevice {
    BlockDevice {
        partition_name: "super".to_string(),
        first_logical_sector: 2048,
        alignment: MIB,
        size: MIB + allocatable,
    }
}

pub fn partition(name: &str, group: &str, extents: Vec<Extent>) -> Partition {
    let mut partition = Partition::new(name, group);
    partition.extents = extents;
    partition
}

pub fn metadata(allocatable: u64, groups: &[(&str, u64)], partitions: Vec<Partition>) -> LpMetadata {
    LpMetadata {
        version: METADATA_VERSION,
        logical_block_size: 4096,
        block_devices: vec![super_device(allocatable)],
        groups: std::iter::once(("default", 0))
            .chain(groups.iter().copied())
            .map(|(name, maximum_size)| Group {
                name: name.to_string(),
                maximum_size,
            })
            .collect(),
        partitions,
    }
}

/// A/B layout on a 300 MiB volume. `system_a` holds three separate linear
/// extents; the `cow` group holds two snapshot partitions and an index.
pub fn ab_metadata() -> LpMetadata {
    metadata(
        300 * MIB,
        &[("main_a", 0), ("main_b", 0), ("cow", 0)],
        vec![
            partition(
                "system_a",
                "main_a",
                vec![
                    Extent::linear(8192, 0, 2048),
                    Extent::linear(4096, 0, 20480),
                    Extent::linear(2048, 0, 40960),
                ],
            ),
            partition("vendor_a", "main_a", vec![Extent::linear(4096, 0, 61440)]),
            partition("system_b", "main_b", vec![Extent::linear(2048, 0, 81920)]),
            partition("system_a-cow", "cow", vec![Extent::linear(2048, 0, 102400)]),
            partition("vendor_a-cow", "cow", vec![Extent::linear(2048, 0, 106496)]),
            partition("cow-index", "cow", vec![Extent::linear(8, 0, 110592)]),
        ],
    )
}

pub fn load(store: &MemoryStore, slot: Slot) -> SuperTable<MemoryStore> {
    SuperTable::load(store.clone(), slot).expect("load table")
}

pub fn context(suffix: SlotSuffix, group: Option<&str>) -> Context {
    Context {
        slot: suffix.slot(),
        suffix,
        super_path: PathBuf::from("/dev/block/by-name/super"),
        group: group.map(str::to_string),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Activate { name: String, commits: usize },
    Deactivate { name: String, commits: usize },
}

/// Mapper that records calls and maps partitions from the committed
/// contents of a [`MemoryStore`].
#[derive(Debug)]
pub struct RecordingMapper {
    store: MemoryStore,
    mapped: RefCell<BTreeMap<String, Vec<Extent>>>,
    events: RefCell<Vec<Event>>,
    fail_activate: Cell<bool>,
    fail_deactivate: Cell<bool>,
}

impl RecordingMapper {
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            store: store.clone(),
            mapped: RefCell::new(BTreeMap::new()),
            events: RefCell::new(Vec::new()),
            fail_activate: Cell::new(false),
            fail_deactivate: Cell::new(false),
        }
    }

    /// Pretend `name` is already mapped with `extents`.
    pub fn premap(&self, name: &str, extents: Vec<Extent>) {
        self.mapped.borrow_mut().insert(name.to_string(), extents);
    }

    pub fn mapping(&self, name: &str) -> Option<Vec<Extent>> {
        self.mapped.borrow().get(name).cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn fail_activate(&self, fail: bool) {
        self.fail_activate.set(fail);
    }

    pub fn fail_deactivate(&self, fail: bool) {
        self.fail_deactivate.set(fail);
    }
}

impl LogicalMapper for RecordingMapper {
    fn state(&self, name: &str) -> DeviceState {
        if self.mapped.borrow().contains_key(name) {
            DeviceState::Active
        } else {
            DeviceState::Inactive
        }
    }

    fn activate(&self, request: &ActivateRequest<'_>) -> lptools_sys::Result<PathBuf> {
        let name = request.partition_name;
        self.events.borrow_mut().push(Event::Activate {
            name: name.to_string(),
            commits: self.store.commit_count(),
        });
        if self.fail_activate.get() {
            return Err(SysError::Timeout {
                what: format!("/dev/mapper/{name}"),
                timeout: request.timeout,
            });
        }

        let metadata = self
            .store
            .metadata(request.slot)
            .ok_or(SysError::SlotOutOfRange(request.slot))?;
        let partition = metadata
            .find_partition(name)
            .ok_or_else(|| SysError::DeviceNotFound(name.to_string()))?;
        self.mapped
            .borrow_mut()
            .insert(name.to_string(), partition.extents.clone());
        Ok(PathBuf::from("/dev/mapper").join(name))
    }

    fn deactivate(&self, name: &str, _timeout: Duration) -> lptools_sys::Result<()> {
        self.events.borrow_mut().push(Event::Deactivate {
            name: name.to_string(),
            commits: self.store.commit_count(),
        });
        if self.fail_deactivate.get() {
            return Err(SysError::OperationFailed(format!("{name}: device busy")));
        }
        self.mapped.borrow_mut().remove(name);
        Ok(())
    }
}

/// Merge gate returning a fixed status.
pub struct FixedGate(pub MergeStatus);

impl MergeStatusGate for FixedGate {
    fn query(&self) -> lptools_sys::Result<MergeStatus> {
        Ok(self.0)
    }
}
