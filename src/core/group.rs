use crate::config::CapacityConfig;
use crate::core::GroupId;
use serde::{Deserialize, Serialize};

/// Capacity counters of one compute group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub available_gpus: u32,
    /// Uplink budget used to bound how many ports a group may commit.
    /// Independent from the fabric's idle-port count.
    pub available_links: u32,
}

/// Per-group GPU and uplink bookkeeping.
///
/// Callers never drive a counter below zero; doing so is a bookkeeping bug
/// and panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRegistry {
    groups: Vec<Group>,
}

impl GroupRegistry {
    pub fn new(num_groups: usize, capacity: &CapacityConfig) -> Self {
        let groups = (0..num_groups)
            .map(|id| Group {
                id,
                available_gpus: capacity.initial_gpus,
                available_links: capacity.initial_links,
            })
            .collect();
        Self { groups }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[inline]
    pub fn get(&self, group_id: GroupId) -> &Group {
        &self.groups[group_id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn adjust_gpus(&mut self, group_id: GroupId, delta: i64) {
        let group = &mut self.groups[group_id];
        group.available_gpus = apply_delta(group.available_gpus, delta, group_id, "GPU");
    }

    pub fn adjust_links(&mut self, group_id: GroupId, delta: i64) {
        let group = &mut self.groups[group_id];
        group.available_links = apply_delta(group.available_links, delta, group_id, "uplink");
    }

    pub fn total_available_gpus(&self) -> u64 {
        self.groups.iter().map(|g| g.available_gpus as u64).sum()
    }
}

fn apply_delta(current: u32, delta: i64, group_id: GroupId, what: &str) -> u32 {
    let updated = current as i64 + delta;
    assert!(
        (0..=u32::MAX as i64).contains(&updated),
        "group {group_id}: {what} count {current} cannot be adjusted by {delta}"
    );
    updated as u32
}
