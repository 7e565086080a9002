//! Communication demand of a placed job.
//!
//! The groups a job occupies exchange data in a ring (all-reduce style). From
//! the ring we derive a bandwidth matrix and a flow-count matrix, and from
//! those the `(min, max)` number of optical circuits each pair of groups needs.

use crate::config::TrafficConfig;
use crate::core::group::GroupRegistry;
use crate::core::placement::Placement;
use crate::core::GroupId;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Dense `n x n` matrix indexed by group id.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix<T> {
    n: usize,
    data: Vec<T>,
}

impl<T: Copy + Default + AddAssign> SquareMatrix<T> {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![T::default(); n * n],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.n + col]
    }

    /// Add `value` to both `(a, b)` and `(b, a)`.
    pub fn add_symmetric(&mut self, a: usize, b: usize, value: T) {
        self.data[a * self.n + b] += value;
        self.data[b * self.n + a] += value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.n..(row + 1) * self.n]
    }
}

/// Circuits wanted between two groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDemand {
    pub group_a: GroupId,
    pub group_b: GroupId,
    pub min_links: u32,
    pub max_links: u32,
}

/// Number of data-parallel participants for `total_gpus`.
#[inline]
pub fn data_parallel_groups(total_gpus: u64, gpus_per_group: u32) -> u64 {
    total_gpus.div_ceil(gpus_per_group as u64)
}

/// Adjacent pairs of the ring over `order`. Two groups form a two-element
/// ring, so their pair is visited twice.
fn ring_pairs(order: &[GroupId]) -> impl Iterator<Item = (GroupId, GroupId)> + '_ {
    let k = order.len();
    (0..k).map(move |i| (order[i], order[(i + 1) % k]))
}

pub struct DemandModel<'a> {
    config: &'a TrafficConfig,
}

impl<'a> DemandModel<'a> {
    pub fn new(config: &'a TrafficConfig) -> Self {
        Self { config }
    }

    /// Inter-group bandwidth in Gbps.
    pub fn traffic_matrix(&self, placement: &Placement) -> SquareMatrix<f64> {
        let n = placement.gpus_per_group().len();
        let mut matrix = SquareMatrix::zeros(n);
        if placement.is_single_group() {
            return matrix;
        }

        let dp_groups =
            data_parallel_groups(placement.total_gpus(), self.config.gpus_per_traffic_group);
        if dp_groups <= 1 {
            return matrix;
        }

        let volume_mb = self.config.message_unit_mb * 2.0 * (dp_groups - 1) as f64;
        let gbps =
            volume_mb * self.config.traffic_batches_per_second * self.config.mb_to_gbits;
        for (a, b) in ring_pairs(placement.order()) {
            matrix.add_symmetric(a, b, gbps);
        }
        matrix
    }

    /// Inter-group flows per second.
    pub fn flow_count_matrix(&self, placement: &Placement) -> SquareMatrix<u64> {
        let n = placement.gpus_per_group().len();
        let mut matrix = SquareMatrix::zeros(n);
        if placement.is_single_group() {
            return matrix;
        }

        let dp_groups =
            data_parallel_groups(placement.total_gpus(), self.config.gpus_per_comm_group);
        if dp_groups <= 1 {
            return matrix;
        }

        let flows = 2 * (dp_groups - 1) * self.config.flow_batches_per_second;
        for (a, b) in ring_pairs(placement.order()) {
            matrix.add_symmetric(a, b, flows);
        }
        matrix
    }

    /// Per-pair circuit demand of `placement`, ordered by `(group_a, group_b)`.
    ///
    /// The uplink budget of a group is read from `registry` *after* the
    /// placement has been committed, so the job's own GPUs already count as
    /// used when its share of the group is computed.
    pub fn link_demands(&self, placement: &Placement, registry: &GroupRegistry) -> Vec<LinkDemand> {
        if placement.is_single_group() {
            return Vec::new();
        }

        let traffic = self.traffic_matrix(placement);
        let flows = self.flow_count_matrix(placement);

        let mut used: Vec<GroupId> = placement.order().to_vec();
        used.sort_unstable();

        let budget = |group: GroupId, pair_traffic: f64| -> f64 {
            let info = registry.get(group);
            let held = placement.gpus_in(group) as f64;
            let share = held / (info.available_gpus as f64 + held);
            let total: f64 = traffic.row(group).iter().sum();
            let ratio = if total > 0.0 { pair_traffic / total } else { 0.0 };
            info.available_links as f64 * share * ratio
        };

        let mut demands = Vec::new();
        for (i, &a) in used.iter().enumerate() {
            for &b in &used[i + 1..] {
                let pair_traffic = traffic.get(a, b);
                if pair_traffic <= 0.0 {
                    continue;
                }

                let by_flows = flows.get(a, b) as f64;
                let by_rate = (pair_traffic / self.config.link_rate_gbps).round_ties_even();
                let by_budget = budget(a, pair_traffic).min(budget(b, pair_traffic));
                let max_links = by_flows.min(by_rate).min(by_budget).floor() as u32;

                if max_links == 0 {
                    tracing::trace!("Pair ({}, {}) has no circuit budget, dropped", a, b);
                    continue;
                }
                demands.push(LinkDemand {
                    group_a: a,
                    group_b: b,
                    min_links: self.config.min_links,
                    max_links: max_links.max(self.config.min_links),
                });
            }
        }
        demands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapacityConfig, PlacementConfig};
    use crate::core::placement::place;

    const EPS: f64 = 1e-6;

    fn registry(groups: usize) -> GroupRegistry {
        GroupRegistry::new(groups, &CapacityConfig::default())
    }

    #[test]
    fn test_data_parallel_groups() {
        assert_eq!(data_parallel_groups(4096, 128), 32);
        assert_eq!(data_parallel_groups(129, 128), 2);
        assert_eq!(data_parallel_groups(128, 128), 1);
    }

    #[test]
    fn test_single_group_has_no_traffic() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        let mut registry = registry(2);
        let placement = place(2048, &mut registry, &PlacementConfig::default()).unwrap();

        let traffic = model.traffic_matrix(&placement);
        assert!(traffic.row(0).iter().all(|&t| t == 0.0));
        assert!(model.link_demands(&placement, &registry).is_empty());
    }

    #[test]
    fn test_one_participant_has_no_traffic() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        // 100 GPUs over two groups is still a single 128-GPU participant
        let placement = Placement::from_gpus(vec![60, 40]);
        assert_eq!(model.traffic_matrix(&placement).get(0, 1), 0.0);
        assert_eq!(model.flow_count_matrix(&placement).get(0, 1), 0);
    }

    #[test]
    fn test_two_group_ring_counts_pair_twice() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        let placement = Placement::from_gpus(vec![2048, 2048]);

        // 12800 MB * 2 * 31 * 20/s * 0.008 Gb/MB, once per ring edge
        let per_edge = 12800.0 * 2.0 * 31.0 * 20.0 * 0.008;
        let traffic = model.traffic_matrix(&placement);
        assert!((traffic.get(0, 1) - 2.0 * per_edge).abs() < EPS);
        assert_eq!(traffic.get(0, 1), traffic.get(1, 0));
        assert_eq!(traffic.get(0, 0), 0.0);

        let flows = model.flow_count_matrix(&placement);
        assert_eq!(flows.get(0, 1), 2 * (2 * 31 * 50));
    }

    #[test]
    fn test_three_group_ring() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        let placement = Placement::from_gpus(vec![1024, 1024, 1024, 0]);
        let traffic = model.traffic_matrix(&placement);

        let per_edge = 12800.0 * 2.0 * 23.0 * 20.0 * 0.008;
        for (a, b) in [(0, 1), (1, 2), (0, 2)] {
            assert!((traffic.get(a, b) - per_edge).abs() < EPS);
        }
        assert_eq!(traffic.get(0, 3), 0.0);
    }

    #[test]
    fn test_link_demand_two_full_groups() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        let mut registry = registry(2);
        let placement = place(4096, &mut registry, &PlacementConfig::default()).unwrap();

        let demands = model.link_demands(&placement, &registry);
        // Rate bound is 2540 and flow bound 6200; the uplink budget (2048) wins
        assert_eq!(
            demands,
            vec![LinkDemand {
                group_a: 0,
                group_b: 1,
                min_links: 1,
                max_links: 2048,
            }]
        );
    }

    #[test]
    fn test_link_demand_limited_by_smaller_share() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        let mut registry = registry(2);
        let placement = place(3000, &mut registry, &PlacementConfig::default()).unwrap();
        assert_eq!(placement.gpus_per_group(), &[2048, 952]);

        let demands = model.link_demands(&placement, &registry);
        // Group 1 devotes 952 of its 2048 GPUs: 2048 * 952/2048 = 952
        assert_eq!(demands[0].max_links, 952);
    }

    #[test]
    fn test_share_is_computed_after_placement_commits() {
        // The job's share of a group is measured against the GPUs still free
        // after the job was placed plus the job's own GPUs; GPUs held by other
        // jobs do not count.
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        let mut registry = registry(2);
        registry.adjust_gpus(1, -1000);
        let placement = place(3000, &mut registry, &PlacementConfig::default()).unwrap();
        assert_eq!(placement.gpus_per_group(), &[2048, 952]);
        assert_eq!(registry.get(1).available_gpus, 96);

        let demands = model.link_demands(&placement, &registry);
        // 2048 * 952 / (96 + 952) = 1860.4, below the rate bound of 1884
        assert_eq!(demands[0].max_links, 1860);
    }

    fn registry_with_free(groups: usize, free: u32) -> GroupRegistry {
        GroupRegistry::new(
            groups,
            &CapacityConfig {
                initial_gpus: free,
                initial_links: 2048,
            },
        )
    }

    #[test]
    fn test_rate_bound_rounds_half_to_even() {
        // Both groups are fully devoted to the job, so only the rate bound binds
        let registry = registry_with_free(2, 0);
        let placement = Placement::from_gpus(vec![128, 128]);

        for (message_unit_mb, expected) in [(5.0, 2), (7.0, 4)] {
            let config = TrafficConfig {
                message_unit_mb,
                traffic_batches_per_second: 1.0,
                mb_to_gbits: 1.0,
                link_rate_gbps: 8.0,
                ..TrafficConfig::default()
            };
            let model = DemandModel::new(&config);
            // Two ring edges of message * 2 * (2 - 1): 20 Gbps -> 2.5, 28 Gbps -> 3.5
            let demands = model.link_demands(&placement, &registry);
            assert_eq!(demands[0].max_links, expected);
        }
    }

    #[test]
    fn test_zero_budget_pairs_are_dropped() {
        let config = TrafficConfig::default();
        let model = DemandModel::new(&config);
        // Tiny uplink budget on group 1: 1 * (128/256) * 1 floors to 0
        let mut registry = GroupRegistry::new(
            2,
            &CapacityConfig {
                initial_gpus: 128,
                initial_links: 1,
            },
        );
        registry.adjust_gpus(0, -128);
        let placement = Placement::from_gpus(vec![128, 128]);
        assert!(model.link_demands(&placement, &registry).is_empty());
    }
}
