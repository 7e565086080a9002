//! Tick-driven admission loop.
//!
//! Every tick first releases the jobs whose lifetime has elapsed, then pulls
//! the jobs that have arrived, then admits strictly FIFO from the pending
//! queue. The first deferral ends the tick's admission pass: later jobs are
//! not tried even if they would fit.

use crate::core::cluster::{Admission, Cluster};
use crate::core::error::AllocError;
use crate::core::job::Job;
use crate::core::matcher::AllocationResult;
use crate::core::workload::JobSource;
use crate::core::{JobId, Tick};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub completed: usize,
    pub admitted: usize,
    /// Jobs still queued after the admission pass
    pub pending: usize,
    pub active: usize,
    pub gpu_utilization: f64,
    pub idle_ports: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub ticks: Tick,
    pub submitted: usize,
    pub admitted: usize,
    pub completed: usize,
    pub deferred_attempts: usize,
    pub infeasible_demand: usize,
    pub link_min_unreachable: usize,
    pub meet_max: usize,
    pub meet_min: usize,
    pub circuits_committed: usize,
    /// Tick of the last completion
    pub makespan: Option<Tick>,
    pub peak_gpu_utilization: f64,
    pub mean_gpu_utilization: f64,
    pub pending_at_end: usize,
    /// The head of the queue can never fit, even on an empty cluster
    pub stalled: bool,
    pub timeline: Vec<TickSummary>,
}

pub struct Simulation<S: JobSource> {
    cluster: Cluster,
    source: S,
    pending: VecDeque<Job>,
    /// `(end tick, job)` of every active job, earliest first
    running: BinaryHeap<Reverse<(Tick, JobId)>>,
    now: Tick,
    report: SimulationReport,
}

impl<S: JobSource> Simulation<S> {
    pub fn new(cluster: Cluster, source: S) -> Self {
        Self {
            cluster,
            source,
            pending: VecDeque::new(),
            running: BinaryHeap::new(),
            now: 0,
            report: SimulationReport::default(),
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn report(&self) -> &SimulationReport {
        &self.report
    }

    /// Nothing queued, running or still to arrive.
    pub fn is_finished(&self) -> bool {
        !self.source.has_more_jobs() && self.pending.is_empty() && self.running.is_empty()
    }

    /// Advance one tick.
    pub fn step(&mut self) -> TickSummary {
        let tick = self.now;
        let completed = self.complete_due(tick);

        while self.source.peek_arrival().is_some_and(|arrival| arrival <= tick) {
            if let Some(job) = self.source.next_job() {
                self.pending.push_back(job);
                self.report.submitted += 1;
            }
        }

        let admitted = self.admit_pending(tick);

        let summary = TickSummary {
            tick,
            completed,
            admitted,
            pending: self.pending.len(),
            active: self.cluster.active_jobs(),
            gpu_utilization: self.cluster.gpu_utilization(),
            idle_ports: self.cluster.idle_link_count_total(),
        };
        tracing::debug!(
            "Tick {}: {} completed, {} admitted, {} pending, {:.1}% GPUs in use",
            tick,
            completed,
            admitted,
            summary.pending,
            summary.gpu_utilization * 100.0
        );

        self.report.ticks += 1;
        self.report.peak_gpu_utilization = self
            .report
            .peak_gpu_utilization
            .max(summary.gpu_utilization);
        self.report.timeline.push(summary.clone());
        self.now += 1;
        summary
    }

    fn complete_due(&mut self, tick: Tick) -> usize {
        let mut completed = 0;
        while let Some(&Reverse((end, job_id))) = self.running.peek() {
            if end > tick {
                break;
            }
            self.running.pop();
            self.cluster.complete(job_id);
            completed += 1;
        }
        if completed > 0 {
            self.report.completed += completed;
            self.report.makespan = Some(tick);
        }
        completed
    }

    fn admit_pending(&mut self, tick: Tick) -> usize {
        let mut admitted = 0;
        while let Some(job) = self.pending.front_mut() {
            match self.cluster.admit(job) {
                Admission::Admitted(outcome) => {
                    match outcome.result {
                        AllocationResult::MeetMax => self.report.meet_max += 1,
                        AllocationResult::MeetMin => self.report.meet_min += 1,
                        AllocationResult::Failure => {
                            unreachable!("admitted job with a failed link match")
                        }
                    }
                    self.report.circuits_committed += outcome.circuits.len();
                    self.running.push(Reverse((tick + job.duration, job.id)));
                    self.pending.pop_front();
                    admitted += 1;
                }
                Admission::Deferred(err) => {
                    tracing::trace!("Tick {}: job {} waits ({})", tick, job.id, err.kind());
                    self.report.deferred_attempts += 1;
                    match err {
                        AllocError::InfeasibleDemand { .. } => self.report.infeasible_demand += 1,
                        AllocError::LinkMinUnreachable { .. } => {
                            self.report.link_min_unreachable += 1
                        }
                    }
                    break;
                }
            }
        }
        self.report.admitted += admitted;
        admitted
    }

    /// Run until every job has completed, the queue stalls, or `max_ticks`
    /// ticks have elapsed.
    pub fn run(&mut self, max_ticks: Tick) -> SimulationReport {
        while self.now < max_ticks && !self.is_finished() {
            self.step();
            if self.running.is_empty() && !self.pending.is_empty() {
                if let Some(head) = self.pending.front() {
                    tracing::error!(
                        "Job {} ({} GPUs) cannot be admitted on an idle cluster, stopping at tick {}",
                        head.id,
                        head.gpu_count,
                        self.now - 1
                    );
                }
                self.report.stalled = true;
                break;
            }
        }

        if !self.is_finished() && !self.report.stalled {
            tracing::warn!(
                "Stopped after {} ticks with {} jobs pending and {} running",
                self.now,
                self.pending.len(),
                self.running.len()
            );
        }

        self.report.pending_at_end = self.pending.len() + self.source.remaining();
        self.report.mean_gpu_utilization = if self.report.timeline.is_empty() {
            0.0
        } else {
            self.report
                .timeline
                .iter()
                .map(|t| t.gpu_utilization)
                .sum::<f64>()
                / self.report.timeline.len() as f64
        };
        tracing::info!(
            "Simulation finished: {} admitted, {} completed, {} deferred attempts over {} ticks",
            self.report.admitted,
            self.report.completed,
            self.report.deferred_attempts,
            self.report.ticks
        );
        self.report.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapacityConfig, TopologyConfig, WorkloadConfig};
    use crate::core::cluster::ClusterBuilder;
    use crate::core::workload::Workload;

    fn small_cluster() -> Cluster {
        ClusterBuilder::new()
            .with_topology(TopologyConfig {
                groups: 4,
                switches_per_group: 4,
                ports_per_switch: 16,
                spine_quadrants: 4,
            })
            .with_capacity(CapacityConfig {
                initial_gpus: 256,
                initial_links: 16,
            })
            .build()
    }

    fn job(id: JobId, gpu_count: u32, duration: Tick) -> Job {
        Job::builder()
            .id(id)
            .gpu_count(gpu_count)
            .duration(duration)
            .build()
    }

    #[test]
    fn test_single_job_lifetime() {
        let workload = Workload::from_jobs(vec![job(0, 300, 2)]);
        let mut sim = Simulation::new(small_cluster(), workload);
        let report = sim.run(100);

        assert_eq!(report.admitted, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.makespan, Some(2));
        assert_eq!(report.ticks, 3);
        assert!(!report.stalled);
        assert_eq!(report.timeline[0].active, 1);
        assert_eq!(report.timeline[2].completed, 1);
        assert_eq!(sim.cluster().info().available_gpus, 1024);
    }

    #[test]
    fn test_fifo_without_backfill() {
        let workload = Workload::from_jobs(vec![job(0, 800, 2), job(1, 800, 1), job(2, 100, 1)]);
        let mut sim = Simulation::new(small_cluster(), workload);

        let first = sim.step();
        assert_eq!(first.admitted, 1);
        // Job 2 would fit but waits behind job 1
        assert_eq!(first.pending, 2);

        let second = sim.step();
        assert_eq!(second.admitted, 0);

        let third = sim.step();
        assert_eq!(third.completed, 1);
        assert_eq!(third.admitted, 2);
        assert_eq!(sim.report().deferred_attempts, 2);
        assert_eq!(sim.report().infeasible_demand, 2);
    }

    #[test]
    fn test_completions_free_resources_in_same_tick() {
        let workload = Workload::from_jobs(vec![job(0, 1024, 1), job(1, 1024, 1)]);
        let mut sim = Simulation::new(small_cluster(), workload);
        let report = sim.run(10);

        assert_eq!(report.timeline[0].admitted, 1);
        assert_eq!(report.timeline[1].completed, 1);
        assert_eq!(report.timeline[1].admitted, 1);
        assert_eq!(report.timeline[0].gpu_utilization, 1.0);
        assert_eq!(report.makespan, Some(2));
    }

    #[test]
    fn test_staggered_arrivals() {
        let workload = Workload::from_jobs(vec![
            job(0, 100, 1),
            Job::builder().id(1).gpu_count(100).arrival(3).build(),
        ]);
        let mut sim = Simulation::new(small_cluster(), workload);
        let report = sim.run(10);

        assert_eq!(report.timeline[0].admitted, 1);
        assert_eq!(report.timeline[3].admitted, 1);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.makespan, Some(4));
    }

    #[test]
    fn test_oversized_job_stalls() {
        let workload = Workload::from_jobs(vec![job(0, 2000, 1), job(1, 10, 1)]);
        let mut sim = Simulation::new(small_cluster(), workload);
        let report = sim.run(100);

        assert!(report.stalled);
        assert_eq!(report.ticks, 1);
        assert_eq!(report.admitted, 0);
        assert_eq!(report.pending_at_end, 2);
    }

    #[test]
    fn test_tick_limit() {
        let workload = Workload::from_jobs(vec![job(0, 1024, 5), job(1, 1024, 5)]);
        let mut sim = Simulation::new(small_cluster(), workload);
        let report = sim.run(1);

        assert_eq!(report.ticks, 1);
        assert!(!report.stalled);
        assert_eq!(report.pending_at_end, 1);
        assert_eq!(report.completed, 0);
    }

    #[test]
    fn test_generated_workload_drains() {
        let workload = Workload::generate(&WorkloadConfig {
            job_count: 20,
            seed: Some(42),
            ..WorkloadConfig::default()
        })
        .unwrap();
        let cluster = ClusterBuilder::new().build();
        let mut sim = Simulation::new(cluster, workload);
        let report = sim.run(10_000);

        assert!(!report.stalled);
        assert_eq!(report.submitted, 20);
        assert_eq!(report.admitted, 20);
        assert_eq!(report.completed, 20);
        assert_eq!(report.meet_max + report.meet_min, 20);
        assert!(report.peak_gpu_utilization > 0.0);
        assert!(report.mean_gpu_utilization <= report.peak_gpu_utilization);

        let info = sim.cluster().info();
        assert_eq!(info.available_gpus, info.total_gpus);
        assert_eq!(info.idle_ports, 64 * 16 * 128);
        assert_eq!(info.active_jobs, 0);
    }
}
