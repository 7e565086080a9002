use anyhow::Context;
use clap::Parser;
use ocsim::core::cluster::ClusterBuilder;
use ocsim::core::simulation::Simulation;
use ocsim::core::workload::Workload;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod output;

#[cfg(target_arch = "x86_64")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.verbosity.tracing_level_filter().to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        ocsim::config::load_config(args.config.as_deref()).context("Failed to load config")?;

    // CLI flags override the config file
    if let Some(algorithm) = args.algorithm {
        config.matcher.algorithm = algorithm;
    }
    if let Some(jobs) = args.jobs {
        config.workload.job_count = jobs;
    }
    if let Some(ref mix) = args.mix {
        config.workload.mix = ocsim::utils::parse_job_mix(mix)?;
    }
    if args.seed.is_some() {
        config.workload.seed = args.seed;
    }
    if args.charge_uplinks {
        config.placement.charge_uplinks = true;
    }
    config.validate()?;

    let groups = args
        .groups
        .as_deref()
        .map(ocsim::utils::parse_group_ids)
        .transpose()?;
    if let Some(ids) = &groups {
        if let Some(bad) = ids.iter().find(|&&g| g >= config.topology.groups) {
            anyhow::bail!(
                "Group {} does not exist (the fabric has {} groups)",
                bad,
                config.topology.groups
            );
        }
    }

    let workload = Workload::generate(&config.workload)?;
    let cluster = ClusterBuilder::from_config(&config).build();
    tracing::info!(
        "Simulating {} jobs on {} groups ({} GPUs) with the {} matcher",
        config.workload.job_count,
        config.topology.groups,
        cluster.total_gpus(),
        config.matcher.algorithm
    );

    let mut simulation = Simulation::new(cluster, workload);
    let report = simulation.run(args.max_ticks);
    let info = simulation.cluster().info();

    if args.json {
        output::print_json(&report, &info)?;
    } else {
        output::print_summary(&report);
        output::print_cluster(&info);
        if args.timeline {
            output::print_timeline(&report);
        }
        if let Some(ids) = &groups {
            output::print_groups(&info, ids);
        }
    }

    if report.stalled {
        anyhow::bail!("Simulation stalled with {} jobs pending", report.pending_at_end);
    }
    Ok(())
}
