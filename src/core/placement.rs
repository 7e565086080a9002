//! Greedy assignment of a job's GPUs to groups.

use crate::config::PlacementConfig;
use crate::core::error::AllocError;
use crate::core::group::GroupRegistry;
use crate::core::GroupId;
use serde::{Deserialize, Serialize};

/// GPUs a job holds in each group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Indexed by group id; zero for groups the job does not use
    gpus: Vec<u32>,
    /// Groups holding GPUs, in the order placement chose them
    order: Vec<GroupId>,
}

impl Placement {
    /// Build a placement from a per-group vector; groups are visited in id order.
    pub fn from_gpus(gpus: Vec<u32>) -> Self {
        let order = gpus
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .map(|(g, _)| g)
            .collect();
        Self { gpus, order }
    }

    #[inline]
    pub fn gpus_per_group(&self) -> &[u32] {
        &self.gpus
    }

    #[inline]
    pub fn gpus_in(&self, group: GroupId) -> u32 {
        self.gpus.get(group).copied().unwrap_or(0)
    }

    #[inline]
    pub fn order(&self) -> &[GroupId] {
        &self.order
    }

    pub fn total_gpus(&self) -> u64 {
        self.gpus.iter().map(|&n| n as u64).sum()
    }

    pub fn is_single_group(&self) -> bool {
        self.order.len() <= 1
    }

    /// Hand every GPU of this placement back to the registry.
    pub fn release(&self, registry: &mut GroupRegistry) {
        for &group in &self.order {
            registry.adjust_gpus(group, self.gpus[group] as i64);
        }
    }
}

/// Greedily place `gpu_count` GPUs over groups in ascending id order.
///
/// Every group after the first must still have `min_member_links` of uplink
/// budget. A second pass re-scans the groups that were not chosen. If the
/// demand cannot be met the registry is restored exactly and
/// [`AllocError::InfeasibleDemand`] is returned.
pub fn place(
    gpu_count: u32,
    registry: &mut GroupRegistry,
    policy: &PlacementConfig,
) -> Result<Placement, AllocError> {
    let mut gpus = vec![0u32; registry.len()];
    let mut order: Vec<GroupId> = Vec::new();
    let mut remaining = gpu_count;

    for pass in 1..=2 {
        for group_id in 0..registry.len() {
            if remaining == 0 {
                break;
            }
            if gpus[group_id] > 0 {
                continue;
            }

            let group = registry.get(group_id);
            if group.available_gpus == 0 {
                continue;
            }
            if !order.is_empty() && group.available_links < policy.min_member_links {
                tracing::trace!(
                    "Pass {}: skipping group {} (uplink budget {} < {})",
                    pass,
                    group_id,
                    group.available_links,
                    policy.min_member_links
                );
                continue;
            }

            let take = group.available_gpus.min(remaining);
            registry.adjust_gpus(group_id, -(take as i64));
            gpus[group_id] = take;
            order.push(group_id);
            remaining -= take;
        }
        if remaining == 0 {
            break;
        }
    }

    let placement = Placement { gpus, order };
    if remaining > 0 {
        placement.release(registry);
        tracing::debug!(
            "Placement of {} GPUs failed with {} unplaced, rolled back",
            gpu_count,
            remaining
        );
        return Err(AllocError::InfeasibleDemand {
            requested: gpu_count,
            unmet: remaining,
        });
    }

    tracing::debug!(
        "Placed {} GPUs over groups {:?}",
        gpu_count,
        placement.order()
    );
    Ok(placement)
}
