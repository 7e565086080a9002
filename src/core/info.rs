use crate::core::matcher::MatchAlgorithm;
use crate::core::GroupId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: GroupId,
    pub available_gpus: u32,
    pub available_links: u32,
    pub idle_ports: usize,
}

/// Point-in-time snapshot of a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterInfo {
    pub groups: Vec<GroupInfo>,
    pub total_gpus: u64,
    pub available_gpus: u64,
    pub idle_ports: usize,
    pub active_jobs: usize,
    pub algorithm: MatchAlgorithm,
}

impl ClusterInfo {
    /// Groups with every GPU taken.
    pub fn full_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.available_gpus == 0).count()
    }

    pub fn gpu_utilization(&self) -> f64 {
        if self.total_gpus == 0 {
            return 0.0;
        }
        1.0 - self.available_gpus as f64 / self.total_gpus as f64
    }
}
