use crate::core::get_config_dir;
use crate::core::matcher::MatchAlgorithm;
use anyhow::{bail, ensure};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SimConfig {
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
}

/// Physical fabric dimensions.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    #[serde(default = "default_groups")]
    pub groups: usize,
    #[serde(default = "default_switches_per_group")]
    pub switches_per_group: usize,
    #[serde(default = "default_ports_per_switch")]
    pub ports_per_switch: usize,
    /// Number of disjoint port ranges a leaf switch can be wired to.
    /// Switch `s` is wired to quadrant `s % spine_quadrants`.
    #[serde(default = "default_spine_quadrants")]
    pub spine_quadrants: usize,
}

fn default_groups() -> usize {
    64
}

fn default_switches_per_group() -> usize {
    16
}

fn default_ports_per_switch() -> usize {
    512
}

fn default_spine_quadrants() -> usize {
    4
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            groups: default_groups(),
            switches_per_group: default_switches_per_group(),
            ports_per_switch: default_ports_per_switch(),
            spine_quadrants: default_spine_quadrants(),
        }
    }
}

impl TopologyConfig {
    /// Width of a single spine quadrant in ports.
    pub fn quadrant_width(&self) -> usize {
        self.ports_per_switch / self.spine_quadrants
    }
}

/// Per-group starting capacity.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CapacityConfig {
    #[serde(default = "default_initial_gpus")]
    pub initial_gpus: u32,
    #[serde(default = "default_initial_links")]
    pub initial_links: u32,
}

fn default_initial_gpus() -> u32 {
    2048
}

fn default_initial_links() -> u32 {
    2048
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            initial_gpus: default_initial_gpus(),
            initial_links: default_initial_links(),
        }
    }
}

/// Constants of the ring all-reduce traffic model.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    /// GPUs forming one data-parallel participant for bandwidth purposes
    #[serde(default = "default_gpus_per_group")]
    pub gpus_per_traffic_group: u32,
    /// Logical message size per participant exchange, in MB
    #[serde(default = "default_message_unit_mb")]
    pub message_unit_mb: f64,
    #[serde(default = "default_traffic_batches_per_second")]
    pub traffic_batches_per_second: f64,
    #[serde(default = "default_mb_to_gbits")]
    pub mb_to_gbits: f64,
    /// GPUs forming one participant for flow-count purposes
    #[serde(default = "default_gpus_per_group")]
    pub gpus_per_comm_group: u32,
    #[serde(default = "default_flow_batches_per_second")]
    pub flow_batches_per_second: u64,
    /// Bandwidth of a single optical port, in Gbps
    #[serde(default = "default_link_rate_gbps")]
    pub link_rate_gbps: f64,
    #[serde(default = "default_min_links")]
    pub min_links: u32,
}

fn default_gpus_per_group() -> u32 {
    128
}

fn default_message_unit_mb() -> f64 {
    128.0 * 100.0
}

fn default_traffic_batches_per_second() -> f64 {
    20.0
}

fn default_mb_to_gbits() -> f64 {
    8.0 / 1000.0
}

fn default_flow_batches_per_second() -> u64 {
    50
}

fn default_link_rate_gbps() -> f64 {
    100.0
}

fn default_min_links() -> u32 {
    1
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            gpus_per_traffic_group: default_gpus_per_group(),
            message_unit_mb: default_message_unit_mb(),
            traffic_batches_per_second: default_traffic_batches_per_second(),
            mb_to_gbits: default_mb_to_gbits(),
            gpus_per_comm_group: default_gpus_per_group(),
            flow_batches_per_second: default_flow_batches_per_second(),
            link_rate_gbps: default_link_rate_gbps(),
            min_links: default_min_links(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlacementConfig {
    /// Uplink budget every non-first group of a placement must still have
    #[serde(default = "default_min_member_links")]
    pub min_member_links: u32,
    /// Debit `available_links` by the circuits a job commits (credited back on completion)
    #[serde(default)]
    pub charge_uplinks: bool,
}

fn default_min_member_links() -> u32 {
    2
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_member_links: default_min_member_links(),
            charge_uplinks: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MatcherConfig {
    #[serde(default)]
    pub algorithm: MatchAlgorithm,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    #[serde(default = "default_job_count")]
    pub job_count: usize,
    /// Seed for the job generator (None = seeded from the OS)
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_mix")]
    pub mix: Vec<JobTemplate>,
}

/// One entry of the job-size distribution.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTemplate {
    pub gpus: u32,
    /// Lifetime in ticks
    pub duration: u64,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_job_count() -> usize {
    200
}

fn default_weight() -> u32 {
    1
}

fn default_mix() -> Vec<JobTemplate> {
    [
        (512, 1, 3),
        (1024, 2, 3),
        (2048, 3, 1),
        (4096, 4, 1),
        (8192, 5, 1),
        (16384, 6, 1),
    ]
    .into_iter()
    .map(|(gpus, duration, weight)| JobTemplate {
        gpus,
        duration,
        weight,
    })
    .collect()
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            job_count: default_job_count(),
            seed: None,
            mix: default_mix(),
        }
    }
}

impl SimConfig {
    /// Reject configurations the simulator cannot be built from.
    pub fn validate(&self) -> anyhow::Result<()> {
        let topo = &self.topology;
        ensure!(topo.groups > 0, "topology.groups must be greater than 0");
        ensure!(
            topo.switches_per_group > 0,
            "topology.switches_per_group must be greater than 0"
        );
        ensure!(
            topo.ports_per_switch > 0,
            "topology.ports_per_switch must be greater than 0"
        );
        ensure!(
            topo.spine_quadrants > 0,
            "topology.spine_quadrants must be greater than 0"
        );
        if topo.ports_per_switch % topo.spine_quadrants != 0 {
            bail!(
                "topology.ports_per_switch ({}) is not divisible by topology.spine_quadrants ({})",
                topo.ports_per_switch,
                topo.spine_quadrants
            );
        }

        let traffic = &self.traffic;
        ensure!(
            traffic.gpus_per_traffic_group > 0 && traffic.gpus_per_comm_group > 0,
            "traffic group sizes must be greater than 0"
        );
        ensure!(
            traffic.link_rate_gbps > 0.0,
            "traffic.link_rate_gbps must be positive"
        );

        let workload = &self.workload;
        ensure!(!workload.mix.is_empty(), "workload.mix must not be empty");
        for template in &workload.mix {
            ensure!(
                template.gpus > 0,
                "workload.mix entries must request at least one GPU"
            );
            ensure!(
                template.weight > 0,
                "workload.mix entry for {} GPUs has zero weight",
                template.gpus
            );
        }
        Ok(())
    }
}

pub fn load_config(config_path: Option<&Path>) -> Result<SimConfig, config::ConfigError> {
    let mut config_vec = vec![];

    // User-provided config file
    if let Some(config_path) = config_path {
        if config_path.exists() {
            config_vec.push(config_path.to_path_buf());
        } else {
            tracing::warn!("Config file {config_path:?} not found.");
        }
    }

    // Default config file
    if let Ok(default_config_path) = get_config_dir().map(|d| d.join("ocsim.toml")) {
        if default_config_path.exists() && config_path.is_none() {
            config_vec.push(default_config_path);
        }
    }

    let settings = config::Config::builder();
    let settings = config_vec.iter().fold(settings, |s, path| {
        s.add_source(config::File::from(path.as_path()))
    });

    // e.g. OCSIM_TOPOLOGY__GROUPS=8, OCSIM_MATCHER__ALGORITHM=native
    settings
        .add_source(
            config::Environment::with_prefix("OCSIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_topology() {
        let config = SimConfig::default();
        assert_eq!(config.topology.groups, 64);
        assert_eq!(config.topology.switches_per_group, 16);
        assert_eq!(config.topology.ports_per_switch, 512);
        assert_eq!(config.topology.quadrant_width(), 128);
        assert_eq!(config.capacity.initial_gpus, 2048);
        assert_eq!(config.capacity.initial_links, 2048);
        assert_eq!(config.traffic.link_rate_gbps, 100.0);
        assert_eq!(config.placement.min_member_links, 2);
        assert!(!config.placement.charge_uplinks);
        assert_eq!(config.matcher.algorithm, MatchAlgorithm::Optimize);
        assert_eq!(config.workload.mix.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[topology]
groups = 4
switches_per_group = 4
ports_per_switch = 16

[capacity]
initial_gpus = 256

[matcher]
algorithm = "native"

[[workload.mix]]
gpus = 128
duration = 2
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.topology.groups, 4);
        assert_eq!(config.topology.ports_per_switch, 16);
        // Unset fields fall back to their defaults
        assert_eq!(config.topology.spine_quadrants, 4);
        assert_eq!(config.capacity.initial_gpus, 256);
        assert_eq!(config.capacity.initial_links, 2048);
        assert_eq!(config.matcher.algorithm, MatchAlgorithm::Native);
        assert_eq!(
            config.workload.mix,
            vec![JobTemplate {
                gpus: 128,
                duration: 2,
                weight: 1
            }]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_uneven_quadrants() {
        let mut config = SimConfig::default();
        config.topology.ports_per_switch = 510;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not divisible"));
    }

    #[test]
    fn test_validate_rejects_empty_mix() {
        let mut config = SimConfig::default();
        config.workload.mix.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_link_rate() {
        let mut config = SimConfig::default();
        config.traffic.link_rate_gbps = 0.0;
        assert!(config.validate().is_err());
    }
}
