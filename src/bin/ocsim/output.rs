use anyhow::Result;
use ocsim::core::info::ClusterInfo;
use ocsim::core::simulation::SimulationReport;
use ocsim::core::GroupId;
use ocsim::utils::format_percent;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{builder::Builder, settings::style::Style, Table, Tabled};

#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a SimulationReport,
    cluster: &'a ClusterInfo,
}

pub fn print_json(report: &SimulationReport, cluster: &ClusterInfo) -> Result<()> {
    let output = JsonOutput { report, cluster };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_summary(report: &SimulationReport) {
    let makespan = report
        .makespan
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    let status = if report.stalled {
        "stalled".red().to_string()
    } else if report.pending_at_end > 0 {
        "truncated".yellow().to_string()
    } else {
        "drained".green().to_string()
    };

    let mut builder = Builder::default();
    builder.push_record(["Metric", "Value"]);
    for (metric, value) in [
        ("Status", status),
        ("Ticks", report.ticks.to_string()),
        ("Makespan", makespan),
        ("Submitted", report.submitted.to_string()),
        ("Admitted", report.admitted.to_string()),
        ("Completed", report.completed.to_string()),
        ("Pending at end", report.pending_at_end.to_string()),
        ("MeetMax", report.meet_max.to_string()),
        ("MeetMin", report.meet_min.to_string()),
        ("Deferred attempts", report.deferred_attempts.to_string()),
        ("  GPU demand", report.infeasible_demand.to_string()),
        ("  Link minimum", report.link_min_unreachable.to_string()),
        ("Circuits committed", report.circuits_committed.to_string()),
        ("Peak GPU use", format_percent(report.peak_gpu_utilization)),
        ("Mean GPU use", format_percent(report.mean_gpu_utilization)),
    ] {
        builder.push_record([metric.to_string(), value]);
    }

    let table = builder.build().with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Final state of the fabric.
pub fn print_cluster(info: &ClusterInfo) {
    let mut builder = Builder::default();
    builder.push_record([
        "Algorithm",
        "Groups",
        "Full groups",
        "Free GPUs",
        "Idle ports",
        "Active jobs",
    ]);
    builder.push_record([
        info.algorithm.to_string(),
        info.groups.len().to_string(),
        info.full_groups().to_string(),
        format!(
            "{}/{} ({})",
            info.available_gpus,
            info.total_gpus,
            format_percent(1.0 - info.gpu_utilization())
        ),
        info.idle_ports.to_string(),
        info.active_jobs.to_string(),
    ]);
    println!("{}", builder.build().with(Style::rounded()).to_string());
}

#[derive(Tabled)]
struct TickRow {
    #[tabled(rename = "TICK")]
    tick: u64,
    #[tabled(rename = "DONE")]
    completed: usize,
    #[tabled(rename = "ADMITTED")]
    admitted: usize,
    #[tabled(rename = "PENDING")]
    pending: usize,
    #[tabled(rename = "ACTIVE")]
    active: usize,
    #[tabled(rename = "GPU USE")]
    gpu_use: String,
    #[tabled(rename = "IDLE PORTS")]
    idle_ports: usize,
}

pub fn print_timeline(report: &SimulationReport) {
    let rows: Vec<TickRow> = report
        .timeline
        .iter()
        .map(|t| TickRow {
            tick: t.tick,
            completed: t.completed,
            admitted: t.admitted,
            pending: t.pending,
            active: t.active,
            gpu_use: format_percent(t.gpu_utilization),
            idle_ports: t.idle_ports,
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", Table::new(&rows).with(Style::empty()).to_string());
    }
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "GROUP")]
    id: GroupId,
    #[tabled(rename = "FREE GPUS")]
    available_gpus: u32,
    #[tabled(rename = "UPLINKS")]
    available_links: u32,
    #[tabled(rename = "IDLE PORTS")]
    idle_ports: usize,
}

pub fn print_groups(info: &ClusterInfo, ids: &[GroupId]) {
    let rows: Vec<GroupRow> = info
        .groups
        .iter()
        .filter(|g| ids.contains(&g.id))
        .map(|g| GroupRow {
            id: g.id,
            available_gpus: g.available_gpus,
            available_links: g.available_links,
            idle_ports: g.idle_ports,
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::empty()).to_string());
}
