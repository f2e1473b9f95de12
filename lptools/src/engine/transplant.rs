// SPDX-License-Identifier: GPL-3.0-only

//! Moving a partition's extents onto a partition with a new name.

use enumflags2::BitFlags;
use lptools_sys::PartitionTable;
use lptools_types::Extent;
use tracing::debug;

use crate::error::{LpError, Result};

/// Replace `replacement` with a partition in `group` that owns the extents
/// of `original`, in the same order. Both old entries are removed.
///
/// The extents are copied before either partition is touched, so the
/// table can be dropped uncommitted if any step fails.
pub fn transplant<T: PartitionTable>(
    table: &mut T,
    original: &str,
    replacement: &str,
    group: &str,
) -> Result<Vec<Extent>> {
    let extents = table
        .find_partition(original)
        .map(|partition| partition.extents.clone())
        .ok_or_else(|| LpError::NotFound(original.to_string()))?;

    table.remove_partition(original);
    table.remove_partition(replacement);
    table.add_partition(replacement, group, BitFlags::empty())?;

    for extent in &extents {
        table.add_extent(replacement, extent.clone())?;
    }

    debug!(
        "moved {} extents from {original} to {replacement} in {group}",
        extents.len()
    );
    Ok(extents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lptools_sys::{MemoryStore, MetadataBuilder, SuperTable};
    use lptools_types::{BlockDevice, LpMetadata, Partition, Slot};

    fn table(partitions: Vec<Partition>) -> SuperTable<MemoryStore> {
        let mut builder = MetadataBuilder::new(
            vec![BlockDevice {
                partition_name: "super".to_string(),
                first_logical_sector: 2048,
                alignment: 1024 * 1024,
                size: 64 * 1024 * 1024,
            }],
            4096,
        );
        builder.add_group("main", 0).expect("group");
        let metadata = LpMetadata {
            partitions,
            ..builder.export()
        };
        SuperTable::load(MemoryStore::new(metadata), Slot::ZERO).expect("load")
    }

    #[test]
    fn keeps_zero_and_linear_extents_in_order() {
        let mut odm = Partition::new("odm_a", "main");
        odm.extents = vec![
            Extent::linear(16, 0, 4096),
            Extent::zero(8),
            Extent::linear(32, 0, 2048),
        ];
        let mut table = table(vec![odm.clone()]);

        let moved = transplant(&mut table, "odm_a", "odm_b", "default").expect("transplant");

        assert_eq!(moved, odm.extents);
        assert!(table.find_partition("odm_a").is_none());
        let odm_b = table.find_partition("odm_b").expect("replacement");
        assert_eq!(odm_b.group_name, "default");
        assert_eq!(odm_b.extents, odm.extents);
        assert_eq!(odm_b.attributes, 0);
    }

    #[test]
    fn missing_original_leaves_table_alone() {
        let mut existing = Partition::new("odm_b", "main");
        existing.extents = vec![Extent::linear(8, 0, 2048)];
        let mut table = table(vec![existing.clone()]);

        let err = transplant(&mut table, "odm_a", "odm_b", "main").expect_err("missing");

        assert!(matches!(err, LpError::NotFound(name) if name == "odm_a"));
        assert_eq!(table.find_partition("odm_b"), Some(&existing));
    }
}
