//! Job arrivals pulled by the simulation.

use crate::config::WorkloadConfig;
use crate::core::job::Job;
use crate::core::{JobId, Tick};
use anyhow::Context;
use rand::distr::{weighted::WeightedIndex, Distribution};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::VecDeque;

/// An ordered stream of jobs, pulled one at a time by the simulation.
pub trait JobSource {
    /// Arrival tick of the next job, `None` once the stream is drained.
    fn peek_arrival(&self) -> Option<Tick>;

    fn next_job(&mut self) -> Option<Job>;

    fn remaining(&self) -> usize;

    fn has_more_jobs(&self) -> bool {
        self.peek_arrival().is_some()
    }
}

/// A finite job list sorted by arrival.
#[derive(Debug, Clone, Default)]
pub struct Workload {
    jobs: VecDeque<Job>,
}

impl Workload {
    /// Sample `job_count` jobs from the weighted size mix. Every job arrives
    /// at tick 0.
    pub fn generate(config: &WorkloadConfig) -> anyhow::Result<Self> {
        let weights = WeightedIndex::new(config.mix.iter().map(|t| t.weight))
            .context("Invalid workload mix weights")?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let jobs = (0..config.job_count)
            .map(|i| {
                let template = config.mix[weights.sample(&mut rng)];
                Job::builder()
                    .id(i as JobId)
                    .gpu_count(template.gpus)
                    .duration(template.duration)
                    .arrival(0)
                    .build()
            })
            .collect::<VecDeque<_>>();

        tracing::debug!(
            "Generated {} jobs requesting {} GPUs in total",
            jobs.len(),
            jobs.iter().map(|j| j.gpu_count as u64).sum::<u64>()
        );
        Ok(Self { jobs })
    }

    /// Wrap an explicit job list. Jobs are stably sorted by arrival.
    pub fn from_jobs(mut jobs: Vec<Job>) -> Self {
        jobs.sort_by_key(|j| j.arrival);
        Self { jobs: jobs.into() }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

impl JobSource for Workload {
    fn peek_arrival(&self) -> Option<Tick> {
        self.jobs.front().map(|j| j.arrival)
    }

    fn next_job(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    fn remaining(&self) -> usize {
        self.jobs.len()
    }
}
