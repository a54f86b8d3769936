//! Cluster overview for operators

use crate::common::{NodeRecord, Result};
use crate::coordinator::CoordinatorClient;

#[derive(Debug)]
pub struct ClusterReport {
    pub nodes: Vec<NodeRecord>,
    pub total_capacity: u64,
    pub total_used: u64,
}

impl ClusterReport {
    pub fn from_nodes(nodes: Vec<NodeRecord>) -> Self {
        let total_capacity = nodes.iter().map(|n| n.capacity_bytes).sum();
        let total_used = nodes.iter().map(|n| n.used_bytes).sum();
        Self {
            nodes,
            total_capacity,
            total_used,
        }
    }

    pub fn total_free(&self) -> u64 {
        self.total_capacity.saturating_sub(self.total_used)
    }
}

/// Online nodes and their combined capacity
pub async fn cluster_status(coordinator: &CoordinatorClient) -> Result<ClusterReport> {
    let nodes = coordinator.available_nodes().await?;
    Ok(ClusterReport::from_nodes(nodes))
}
