//! Admission and release of jobs against the live cluster.
//!
//! An admission places GPUs, derives link demand and matches it on a working
//! copy of the idle ports. Only a successful match is committed; any failure
//! leaves the registry and the fabric as they were.

use crate::config::{CapacityConfig, PlacementConfig, SimConfig, TopologyConfig, TrafficConfig};
use crate::core::demand::DemandModel;
use crate::core::error::AllocError;
use crate::core::fabric::{Circuit, PortFabric};
use crate::core::group::GroupRegistry;
use crate::core::info::{ClusterInfo, GroupInfo};
use crate::core::job::{Job, JobState};
use crate::core::matcher::{match_links, AllocationResult, MatchAlgorithm, PairShortfall};
use crate::core::placement::{place, Placement};
use crate::core::{GroupId, JobId};
use std::collections::HashMap;

/// Resources an active job holds.
#[derive(Debug, Clone)]
pub struct Footprint {
    pub job: Job,
    pub placement: Placement,
    pub circuit_count: usize,
    pub result: AllocationResult,
    /// Uplink budget debited per group (only with `charge_uplinks`)
    pub uplinks_charged: Vec<(GroupId, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub job_id: JobId,
    /// `(group, gpus)` in placement order
    pub groups: Vec<(GroupId, u32)>,
    pub circuits: Vec<Circuit>,
    /// `MeetMax` or `MeetMin`
    pub result: AllocationResult,
    pub shortfalls: Vec<PairShortfall>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(Admitted),
    /// Nothing was kept; the job stays `Requested`
    Deferred(AllocError),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Group registry and port fabric with the admit/complete transactions on top.
pub struct Cluster {
    registry: GroupRegistry,
    fabric: PortFabric,
    traffic: TrafficConfig,
    placement: PlacementConfig,
    algorithm: MatchAlgorithm,
    total_gpus: u64,
    active: HashMap<JobId, Footprint>,
}

impl Cluster {
    /// Try to place and link `job`.
    ///
    /// On success the job is `Active` and owns its GPUs and circuits. On
    /// deferral every GPU and port taken during the attempt has been returned
    /// and the job is back to `Requested`.
    pub fn admit(&mut self, job: &mut Job) -> Admission {
        assert!(
            !self.active.contains_key(&job.id),
            "job {} is already active",
            job.id
        );

        let placement = match place(job.gpu_count, &mut self.registry, &self.placement) {
            Ok(placement) => placement,
            Err(e) => {
                tracing::debug!("Job {} deferred: {}", job.id, e);
                return Admission::Deferred(e);
            }
        };
        job.transition(JobState::Placed);

        // Placement has already been committed to the registry at this point,
        // which the demand model's budget term depends on.
        let demands = DemandModel::new(&self.traffic).link_demands(&placement, &self.registry);

        let mut working = self.fabric.working_copy();
        let outcome = match_links(&mut working, &demands, self.algorithm);
        drop(working);

        if outcome.result == AllocationResult::Failure {
            placement.release(&mut self.registry);
            job.transition(JobState::Requested);
            let err = match outcome.shortfalls.first() {
                Some(short) => AllocError::LinkMinUnreachable {
                    group_a: short.group_a,
                    group_b: short.group_b,
                    required: short.wanted,
                    matched: short.matched,
                },
                None => unreachable!("failed match without a shortfall"),
            };
            tracing::debug!("Job {} deferred: {}", job.id, err);
            return Admission::Deferred(err);
        }

        self.fabric.reserve(job.id, outcome.circuits.clone());
        job.transition(JobState::Linked);

        if outcome.result == AllocationResult::MeetMin {
            tracing::warn!(
                "Job {} admitted below its link maximum on {} pair(s): {:?}",
                job.id,
                outcome.shortfalls.len(),
                outcome.shortfalls
            );
        }

        let uplinks_charged = if self.placement.charge_uplinks {
            self.charge_uplinks(&placement, &outcome.circuits)
        } else {
            Vec::new()
        };

        job.transition(JobState::Active);
        tracing::info!(
            "Job {} admitted: {} GPUs over {} group(s), {} circuits ({})",
            job.id,
            job.gpu_count,
            placement.order().len(),
            outcome.circuits.len(),
            outcome.result
        );

        let groups = placement
            .order()
            .iter()
            .map(|&g| (g, placement.gpus_in(g)))
            .collect();
        self.active.insert(
            job.id,
            Footprint {
                job: job.clone(),
                placement,
                circuit_count: outcome.circuits.len(),
                result: outcome.result,
                uplinks_charged,
            },
        );

        Admission::Admitted(Admitted {
            job_id: job.id,
            groups,
            circuits: outcome.circuits,
            result: outcome.result,
            shortfalls: outcome.shortfalls,
        })
    }

    /// Release everything `job_id` holds. Panics if the job is not active.
    pub fn complete(&mut self, job_id: JobId) -> Footprint {
        let Some(mut footprint) = self.active.remove(&job_id) else {
            panic!("job {job_id} is not active");
        };

        let circuits = self.fabric.release(job_id);
        debug_assert_eq!(circuits.len(), footprint.circuit_count);
        footprint.placement.release(&mut self.registry);
        for &(group, charged) in &footprint.uplinks_charged {
            self.registry.adjust_links(group, charged as i64);
        }

        footprint.job.transition(JobState::Completed);
        tracing::info!(
            "Job {} completed, released {} GPUs and {} circuits",
            job_id,
            footprint.placement.total_gpus(),
            circuits.len()
        );
        footprint
    }

    fn charge_uplinks(&mut self, placement: &Placement, circuits: &[Circuit]) -> Vec<(GroupId, u32)> {
        let mut charged = Vec::new();
        for &group in placement.order() {
            let used = circuits.iter().filter(|c| c.touches(group)).count() as u32;
            let debit = used.min(self.registry.get(group).available_links);
            if debit > 0 {
                self.registry.adjust_links(group, -(debit as i64));
                charged.push((group, debit));
            }
        }
        charged
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn fabric(&self) -> &PortFabric {
        &self.fabric
    }

    pub fn footprint(&self, job_id: JobId) -> Option<&Footprint> {
        self.active.get(&job_id)
    }

    pub fn active_jobs(&self) -> usize {
        self.active.len()
    }

    pub fn total_gpus(&self) -> u64 {
        self.total_gpus
    }

    /// GPUs held by active jobs.
    pub fn held_gpus(&self) -> u64 {
        self.active.values().map(|f| f.placement.total_gpus()).sum()
    }

    pub fn gpu_utilization(&self) -> f64 {
        if self.total_gpus == 0 {
            return 0.0;
        }
        self.held_gpus() as f64 / self.total_gpus as f64
    }

    pub fn idle_link_count(&self, group: GroupId) -> usize {
        self.fabric.idle_link_count(group)
    }

    pub fn idle_link_count_total(&self) -> usize {
        self.fabric.idle_link_count_total()
    }

    pub fn info(&self) -> ClusterInfo {
        let groups = self
            .registry
            .iter()
            .map(|g| GroupInfo {
                id: g.id,
                available_gpus: g.available_gpus,
                available_links: g.available_links,
                idle_ports: self.fabric.idle_link_count(g.id),
            })
            .collect();
        ClusterInfo {
            groups,
            total_gpus: self.total_gpus,
            available_gpus: self.registry.total_available_gpus(),
            idle_ports: self.fabric.idle_link_count_total(),
            active_jobs: self.active.len(),
            algorithm: self.algorithm,
        }
    }
}

/// Builder for creating Cluster instances at any scale
pub struct ClusterBuilder {
    topology: TopologyConfig,
    capacity: CapacityConfig,
    traffic: TrafficConfig,
    placement: PlacementConfig,
    algorithm: MatchAlgorithm,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            topology: TopologyConfig::default(),
            capacity: CapacityConfig::default(),
            traffic: TrafficConfig::default(),
            placement: PlacementConfig::default(),
            algorithm: MatchAlgorithm::default(),
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            topology: config.topology.clone(),
            capacity: config.capacity.clone(),
            traffic: config.traffic.clone(),
            placement: config.placement.clone(),
            algorithm: config.matcher.algorithm,
        }
    }

    pub fn with_topology(mut self, topology: TopologyConfig) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_capacity(mut self, capacity: CapacityConfig) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_traffic(mut self, traffic: TrafficConfig) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn with_placement(mut self, placement: PlacementConfig) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_algorithm(mut self, algorithm: MatchAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn build(self) -> Cluster {
        let registry = GroupRegistry::new(self.topology.groups, &self.capacity);
        Cluster {
            total_gpus: registry.total_available_gpus(),
            registry,
            fabric: PortFabric::new(&self.topology),
            traffic: self.traffic,
            placement: self.placement,
            algorithm: self.algorithm,
            active: HashMap::new(),
        }
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
