//! Usage counts of state and switch values, and of the switch container leaves gated by them.
//!
//! A leaf needs a combination of group values. Its files are wanted exactly while every value of
//! that combination is active, i.e. loaded by at least one group value node.

use std::collections::BTreeSet;

use super::cooked::{GroupValueCookedData, SwitchContainerLeafCookedData};
use super::loaded::{Job, LeafHandle, LoadedData};
use crate::utils::{FastHashMap, ObjectPool};

#[derive(Debug, Default)]
pub struct GroupValueInfo {
    pub group_value_count: u32,
    pub leaves: Vec<LeafHandle>,
}

impl GroupValueInfo {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.group_value_count > 0
    }
}

pub struct LeafUsageCount {
    pub key: SwitchContainerLeafCookedData,
    pub loaded_group_values: BTreeSet<GroupValueCookedData>,
    pub loaded: LoadedData,
    pub processing: u32,
    pub(crate) waiting: Vec<Job>,
}

impl LeafUsageCount {
    pub fn new(key: SwitchContainerLeafCookedData) -> Self {
        LeafUsageCount {
            key,
            loaded_group_values: BTreeSet::new(),
            loaded: LoadedData::default(),
            processing: 0,
            waiting: Vec::new(),
        }
    }

    /// Returns true if every group value the leaf needs is active.
    pub fn has_all_keys(&self) -> bool {
        !self.key.group_value_set.is_empty()
            && self
                .key
                .group_value_set
                .iter()
                .all(|v| self.loaded_group_values.contains(v))
    }
}

#[derive(Default)]
pub struct SwitchIndex {
    pub infos: FastHashMap<GroupValueCookedData, GroupValueInfo>,
    pub leaves: ObjectPool<LeafHandle, LeafUsageCount>,
}

impl SwitchIndex {
    pub fn new() -> Self {
        SwitchIndex::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty() && self.leaves.is_empty()
    }

    /// Registers a leaf under each of its group values. The leaf starts with the values that
    /// are already active.
    pub fn add_leaf(&mut self, key: SwitchContainerLeafCookedData) -> LeafHandle {
        let mut usage = LeafUsageCount::new(key);

        for &v in &usage.key.group_value_set {
            if self.infos.get(&v).map(|info| info.is_active()).unwrap_or(false) {
                usage.loaded_group_values.insert(v);
            }
        }

        let group_values: Vec<_> = usage.key.group_value_set.iter().cloned().collect();
        let handle = self.leaves.create(usage);

        for v in group_values {
            self.infos.entry(v).or_default().leaves.push(handle);
        }

        handle
    }

    /// Unregisters a leaf from its group values, dropping the records nobody uses anymore. The
    /// leaf loses all its active values, but its record stays until `leaves.free`.
    pub fn remove_leaf(&mut self, leaf: LeafHandle) {
        let group_values: Vec<_> = match self.leaves.get(leaf) {
            Some(usage) => usage.key.group_value_set.iter().cloned().collect(),
            None => return,
        };

        for v in group_values {
            let (active, unused) = match self.infos.get_mut(&v) {
                Some(info) => {
                    info.leaves.retain(|&h| h != leaf);
                    (info.is_active(), info.leaves.is_empty() && !info.is_active())
                }
                None => {
                    error!("Leaf {} is not registered under {:?}.", leaf, v);
                    continue;
                }
            };

            if let Some(usage) = self.leaves.get_mut(leaf) {
                if usage.loaded_group_values.remove(&v) != active {
                    error!(
                        "Leaf {} disagrees with the usage count of {:?} (active: {}).",
                        leaf, v, active
                    );
                }
            }

            if unused {
                self.infos.remove(&v);
            }
        }
    }

    /// Counts one more user of `v`. Returns the leaves that just gained it.
    pub fn activate(&mut self, v: GroupValueCookedData) -> Vec<LeafHandle> {
        let info = self.infos.entry(v).or_default();
        info.group_value_count += 1;

        if info.group_value_count > 1 {
            return Vec::new();
        }

        let mut gained = Vec::new();
        for &leaf in &info.leaves {
            if let Some(usage) = self.leaves.get_mut(leaf) {
                if usage.loaded_group_values.insert(v) {
                    gained.push(leaf);
                } else {
                    error!("Leaf {} already had {:?}.", leaf, v);
                }
            }
        }

        gained
    }

    /// Counts one less user of `v`. Returns the leaves that just lost it.
    pub fn deactivate(&mut self, v: GroupValueCookedData) -> Vec<LeafHandle> {
        let remove = match self.infos.get_mut(&v) {
            Some(info) if info.is_active() => {
                info.group_value_count -= 1;
                if info.is_active() {
                    return Vec::new();
                }

                info.leaves.is_empty()
            }
            _ => {
                error!("Group value {:?} is not loaded.", v);
                return Vec::new();
            }
        };

        if remove {
            self.infos.remove(&v);
            return Vec::new();
        }

        let leaves = self.infos.get(&v).map(|v| v.leaves.clone()).unwrap_or_default();
        for &leaf in &leaves {
            if let Some(usage) = self.leaves.get_mut(leaf) {
                if !usage.loaded_group_values.remove(&v) {
                    error!("Leaf {} did not have {:?}.", leaf, v);
                }
            }
        }

        leaves
    }
}
