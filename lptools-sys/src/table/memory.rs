// SPDX-License-Identifier: GPL-3.0-only

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use lptools_types::{LpMetadata, Slot};

use super::MetadataStore;
use crate::{Result, SysError};

#[derive(Debug, Default)]
struct MemoryState {
    slots: BTreeMap<u32, LpMetadata>,
    commits: usize,
    fail_commits: bool,
}

/// Metadata store kept in memory. Clones share state, so a test can keep a
/// handle after the table that owns the other one has been committed.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStore {
    /// A store holding `metadata` in both slots.
    pub fn new(metadata: LpMetadata) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.borrow_mut();
            state.slots.insert(0, metadata.clone());
            state.slots.insert(1, metadata);
        }
        store
    }

    pub fn metadata(&self, slot: Slot) -> Option<LpMetadata> {
        self.state.borrow().slots.get(&slot.number()).cloned()
    }

    pub fn commit_count(&self) -> usize {
        self.state.borrow().commits
    }

    /// Make every following commit fail without touching the stored copy.
    pub fn fail_commits(&self, fail: bool) {
        self.state.borrow_mut().fail_commits = fail;
    }
}

impl MetadataStore for MemoryStore {
    fn load(&self, slot: Slot) -> Result<LpMetadata> {
        self.metadata(slot).ok_or(SysError::SlotOutOfRange(slot))
    }

    fn commit(&self, metadata: &LpMetadata, slot: Slot) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_commits {
            return Err(SysError::OperationFailed(
                "metadata write rejected".to_string(),
            ));
        }
        state.slots.insert(slot.number(), metadata.clone());
        state.commits += 1;
        Ok(())
    }
}
