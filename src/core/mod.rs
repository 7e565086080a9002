pub mod cluster;
pub mod demand;
pub mod error;
pub mod fabric;
pub mod group;
pub mod info;
pub mod job;
pub mod matcher;
pub mod placement;
pub mod simulation;
pub mod workload;

use std::path::PathBuf;

pub type GroupId = usize;
pub type SwitchId = usize;
pub type PortId = usize;
pub type JobId = u32;
/// Simulation time step
pub type Tick = u64;

pub fn version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")")
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))
        .map(|p| p.join("ocsim"))
}
