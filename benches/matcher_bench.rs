//! Benchmarks for link matching and admission on the full-size fabric
//!
//! This benchmark suite measures:
//! - Matching a single large pair with both algorithms
//! - Matching a multi-group ring of pairs on a partly used fabric
//! - End-to-end admit/complete of jobs of growing size

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use ocsim::config::{PlacementConfig, TopologyConfig, TrafficConfig};
use ocsim::core::cluster::{Admission, ClusterBuilder};
use ocsim::core::demand::{DemandModel, LinkDemand};
use ocsim::core::fabric::IdlePorts;
use ocsim::core::group::GroupRegistry;
use ocsim::core::job::Job;
use ocsim::core::matcher::{match_links, MatchAlgorithm};
use ocsim::core::placement::place;
use std::hint::black_box;
use strum::IntoEnumIterator;

fn full_fabric() -> IdlePorts {
    IdlePorts::new(&TopologyConfig::default())
}

/// Demands of a job of `gpus` GPUs placed on an empty cluster.
fn demands_for(gpus: u32) -> Vec<LinkDemand> {
    let mut registry = GroupRegistry::new(64, &Default::default());
    let placement = place(gpus, &mut registry, &PlacementConfig::default())
        .expect("job fits on an empty cluster");
    let traffic = TrafficConfig::default();
    DemandModel::new(&traffic).link_demands(&placement, &registry)
}

fn bench_single_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher/single_pair");
    let demands = demands_for(4096);
    let circuits: u64 = demands.iter().map(|d| d.max_links as u64).sum();

    for algorithm in MatchAlgorithm::iter() {
        group.throughput(Throughput::Elements(circuits));
        group.bench_with_input(
            BenchmarkId::new(algorithm.to_string(), 4096),
            &demands,
            |b, demands| {
                b.iter_batched(
                    full_fabric,
                    |mut ports| black_box(match_links(&mut ports, demands, algorithm)),
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher/ring");
    group.sample_size(20);

    for gpus in [8_192u32, 16_384, 32_768] {
        let demands = demands_for(gpus);
        for algorithm in MatchAlgorithm::iter() {
            group.bench_with_input(
                BenchmarkId::new(algorithm.to_string(), gpus),
                &demands,
                |b, demands| {
                    b.iter_batched(
                        full_fabric,
                        |mut ports| black_box(match_links(&mut ports, demands, algorithm)),
                        BatchSize::SmallInput,
                    );
                },
            );
        }
    }

    group.finish();
}

/// Admission on a cluster already a quarter full, including the rollback-free
/// commit and the release on completion.
fn bench_admit_complete(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster/admit_complete");
    group.sample_size(20);

    for gpus in [512u32, 4_096, 16_384] {
        for algorithm in MatchAlgorithm::iter() {
            group.bench_with_input(
                BenchmarkId::new(algorithm.to_string(), gpus),
                &gpus,
                |b, &gpus| {
                    b.iter_batched(
                        || {
                            let mut cluster =
                                ClusterBuilder::new().with_algorithm(algorithm).build();
                            for id in 0..4 {
                                let mut filler = Job::builder().id(id).gpu_count(8_192).build();
                                cluster.admit(&mut filler);
                            }
                            cluster
                        },
                        |mut cluster| {
                            let mut job = Job::builder().id(100).gpu_count(gpus).build();
                            if let Admission::Admitted(_) = cluster.admit(&mut job) {
                                cluster.complete(100);
                            }
                            black_box(cluster.idle_link_count_total())
                        },
                        BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

criterion_group!(
    matcher_benches,
    bench_single_pair,
    bench_ring,
    bench_admit_complete
);
criterion_main!(matcher_benches);
