pub mod config;
pub mod core;
pub mod utils;

pub use crate::config::{load_config, SimConfig};
pub use crate::core::cluster::{Admission, Cluster, ClusterBuilder};
pub use crate::core::simulation::{Simulation, SimulationReport};
