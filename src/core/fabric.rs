//! Optical port state of every leaf switch.
//!
//! Each `(group, switch)` owns a fixed-width bit set of port indices; a set bit
//! means the port is idle. A switch is wired to exactly one spine quadrant, so
//! only ports inside that quadrant can ever be idle. Two switches can be joined
//! by a circuit only through the *same* port index on both ends.

use crate::config::TopologyConfig;
use crate::core::{GroupId, JobId, PortId, SwitchId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::ops::Range;

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-width bit set of port indices. 512 ports fit inline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortSet {
    words: SmallVec<[u64; 8]>,
    len: usize,
}

impl PortSet {
    pub fn empty(len: usize) -> Self {
        Self {
            words: SmallVec::from_elem(0, len.div_ceil(WORD_BITS)),
            len,
        }
    }

    pub fn with_range(len: usize, range: Range<usize>) -> Self {
        let mut set = Self::empty(len);
        for port in range {
            set.set(port);
        }
        set
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn contains(&self, port: PortId) -> bool {
        debug_assert!(port < self.len, "port {port} out of range {}", self.len);
        self.words[port / WORD_BITS] & (1 << (port % WORD_BITS)) != 0
    }

    #[inline]
    pub fn set(&mut self, port: PortId) {
        debug_assert!(port < self.len, "port {port} out of range {}", self.len);
        self.words[port / WORD_BITS] |= 1 << (port % WORD_BITS);
    }

    #[inline]
    pub fn clear(&mut self, port: PortId) {
        debug_assert!(port < self.len, "port {port} out of range {}", self.len);
        self.words[port / WORD_BITS] &= !(1 << (port % WORD_BITS));
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lowest port index set in both `self` and `other`.
    pub fn first_common(&self, other: &PortSet) -> Option<PortId> {
        self.words
            .iter()
            .zip(other.words.iter())
            .enumerate()
            .find_map(|(i, (a, b))| {
                let both = a & b;
                (both != 0).then(|| i * WORD_BITS + both.trailing_zeros() as usize)
            })
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = PortId> + '_ {
        (0..self.len).filter(move |&port| self.contains(port))
    }
}

/// One optical circuit: the same port index on a switch of each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Circuit {
    pub src_group: GroupId,
    pub src_switch: SwitchId,
    pub dst_group: GroupId,
    pub dst_switch: SwitchId,
    pub port: PortId,
}

impl Circuit {
    pub fn touches(&self, group: GroupId) -> bool {
        self.src_group == group || self.dst_group == group
    }
}

/// Idle-port arena indexed by `(group, switch)`.
///
/// This is also the disposable working copy the matchers operate on: a clone
/// is cheap (a few kilobytes per group) and is simply dropped when an attempt
/// fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlePorts {
    num_groups: usize,
    switches_per_group: usize,
    ports_per_switch: usize,
    quadrant_width: usize,
    spine_quadrants: usize,
    sets: Vec<PortSet>,
}

impl IdlePorts {
    pub fn new(topology: &TopologyConfig) -> Self {
        let quadrant_width = topology.quadrant_width();
        let mut sets = Vec::with_capacity(topology.groups * topology.switches_per_group);
        for _ in 0..topology.groups {
            for switch in 0..topology.switches_per_group {
                let start = (switch % topology.spine_quadrants) * quadrant_width;
                sets.push(PortSet::with_range(
                    topology.ports_per_switch,
                    start..start + quadrant_width,
                ));
            }
        }
        Self {
            num_groups: topology.groups,
            switches_per_group: topology.switches_per_group,
            ports_per_switch: topology.ports_per_switch,
            quadrant_width,
            spine_quadrants: topology.spine_quadrants,
            sets,
        }
    }

    #[inline]
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    #[inline]
    pub fn switches_per_group(&self) -> usize {
        self.switches_per_group
    }

    #[inline]
    pub fn ports_per_switch(&self) -> usize {
        self.ports_per_switch
    }

    /// Ports a single switch can ever have idle.
    #[inline]
    pub fn wired_ports_per_switch(&self) -> usize {
        self.quadrant_width
    }

    #[inline]
    fn index(&self, group: GroupId, switch: SwitchId) -> usize {
        debug_assert!(group < self.num_groups && switch < self.switches_per_group);
        group * self.switches_per_group + switch
    }

    #[inline]
    pub fn switch(&self, group: GroupId, switch: SwitchId) -> &PortSet {
        &self.sets[self.index(group, switch)]
    }

    #[inline]
    pub fn is_idle(&self, group: GroupId, switch: SwitchId, port: PortId) -> bool {
        self.switch(group, switch).contains(port)
    }

    /// Whether `port` lies in the quadrant `switch` is wired to.
    pub fn is_wired(&self, switch: SwitchId, port: PortId) -> bool {
        let start = (switch % self.spine_quadrants) * self.quadrant_width;
        (start..start + self.quadrant_width).contains(&port)
    }

    pub fn first_common(
        &self,
        group_a: GroupId,
        switch_a: SwitchId,
        group_b: GroupId,
        switch_b: SwitchId,
    ) -> Option<PortId> {
        self.switch(group_a, switch_a)
            .first_common(self.switch(group_b, switch_b))
    }

    /// Mark both endpoints of `circuit` busy. Panics if either is not idle.
    pub fn take(&mut self, circuit: &Circuit) {
        for (group, switch) in [
            (circuit.src_group, circuit.src_switch),
            (circuit.dst_group, circuit.dst_switch),
        ] {
            let idx = self.index(group, switch);
            assert!(
                self.sets[idx].contains(circuit.port),
                "port {} of group {group} switch {switch} is not idle",
                circuit.port
            );
            self.sets[idx].clear(circuit.port);
        }
    }

    /// Mark both endpoints of `circuit` idle again. Panics if either is
    /// already idle or is not wired.
    pub fn put_back(&mut self, circuit: &Circuit) {
        for (group, switch) in [
            (circuit.src_group, circuit.src_switch),
            (circuit.dst_group, circuit.dst_switch),
        ] {
            assert!(
                self.is_wired(switch, circuit.port),
                "port {} is not wired to switch {switch}",
                circuit.port
            );
            let idx = self.index(group, switch);
            assert!(
                !self.sets[idx].contains(circuit.port),
                "port {} of group {group} switch {switch} is already idle",
                circuit.port
            );
            self.sets[idx].set(circuit.port);
        }
    }

    #[cfg(test)]
    pub(crate) fn clear_port(&mut self, group: GroupId, switch: SwitchId, port: PortId) {
        let idx = self.index(group, switch);
        self.sets[idx].clear(port);
    }

    pub fn idle_count(&self, group: GroupId) -> usize {
        let start = self.index(group, 0);
        self.sets[start..start + self.switches_per_group]
            .iter()
            .map(PortSet::count_ones)
            .sum()
    }

    pub fn idle_count_total(&self) -> usize {
        self.sets.iter().map(PortSet::count_ones).sum()
    }
}

/// The live fabric: idle ports plus the circuits committed to each job.
#[derive(Debug, Clone)]
pub struct PortFabric {
    idle: IdlePorts,
    links_for_job: HashMap<JobId, Vec<Circuit>>,
}

impl PortFabric {
    pub fn new(topology: &TopologyConfig) -> Self {
        Self {
            idle: IdlePorts::new(topology),
            links_for_job: HashMap::new(),
        }
    }

    /// Disposable copy of the idle state for a matching attempt.
    pub fn working_copy(&self) -> IdlePorts {
        self.idle.clone()
    }

    pub fn idle_ports(&self) -> &IdlePorts {
        &self.idle
    }

    /// Commit `circuits` to `job_id`.
    ///
    /// Panics if the job already holds circuits or any endpoint is busy.
    pub fn reserve(&mut self, job_id: JobId, circuits: Vec<Circuit>) {
        assert!(
            !self.links_for_job.contains_key(&job_id),
            "job {job_id} already holds circuits"
        );
        for circuit in &circuits {
            self.idle.take(circuit);
        }
        tracing::debug!("Reserved {} circuits for job {}", circuits.len(), job_id);
        self.links_for_job.insert(job_id, circuits);
    }

    /// Return every circuit held by `job_id` to the idle pool.
    ///
    /// Panics if `job_id` holds nothing or any endpoint is already idle.
    pub fn release(&mut self, job_id: JobId) -> Vec<Circuit> {
        let Some(circuits) = self.links_for_job.remove(&job_id) else {
            panic!("job {job_id} holds no circuits");
        };
        for circuit in &circuits {
            self.idle.put_back(circuit);
        }
        tracing::debug!("Released {} circuits of job {}", circuits.len(), job_id);
        circuits
    }

    pub fn circuits_for(&self, job_id: JobId) -> Option<&[Circuit]> {
        self.links_for_job.get(&job_id).map(Vec::as_slice)
    }

    pub fn idle_link_count(&self, group: GroupId) -> usize {
        self.idle.idle_count(group)
    }

    pub fn idle_link_count_total(&self) -> usize {
        self.idle.idle_count_total()
    }

    /// Committed circuit endpoints landing on `(group, switch)`.
    pub fn busy_port_count(&self, group: GroupId, switch: SwitchId) -> usize {
        self.links_for_job
            .values()
            .flatten()
            .map(|c| {
                usize::from(c.src_group == group && c.src_switch == switch)
                    + usize::from(c.dst_group == group && c.dst_switch == switch)
            })
            .sum()
    }
}
