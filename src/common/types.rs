//! Cluster records shared by the coordinator, storage nodes and gateways

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness of a storage node as last evaluated by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

impl NodeStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NodeStatus::Online)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Registry entry for one storage node.
///
/// Created on registration and never removed; nodes that stop heartbeating
/// stay in the registry marked offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
    #[serde(rename = "storage_capacity")]
    pub capacity_bytes: u64,
    #[serde(rename = "used_storage")]
    pub used_bytes: u64,
    /// Unix time in milliseconds
    pub last_heartbeat: u64,
    pub status: NodeStatus,
}

impl NodeRecord {
    /// Bytes still available for placement. Saturates when a node reports
    /// more usage than capacity.
    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }

    /// `ip:port` the node serves transfers on
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// What a user sees for one of their files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub upload_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_record_wire_names() {
        let record = NodeRecord {
            node_id: "a1b2c3d4".into(),
            ip: "10.0.0.5".into(),
            port: 10001,
            capacity_bytes: 100,
            used_bytes: 40,
            last_heartbeat: 1_700_000_000_000,
            status: NodeStatus::Online,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["storage_capacity"], 100);
        assert_eq!(json["used_storage"], 40);
        assert_eq!(json["status"], "online");
        assert_eq!(record.free_bytes(), 60);
        assert_eq!(record.address(), "10.0.0.5:10001");
    }

    #[test]
    fn test_free_bytes_saturates() {
        let record = NodeRecord {
            node_id: "n".into(),
            ip: "127.0.0.1".into(),
            port: 1,
            capacity_bytes: 10,
            used_bytes: 12,
            last_heartbeat: 0,
            status: NodeStatus::Offline,
        };
        assert_eq!(record.free_bytes(), 0);
        assert!(!record.status.is_online());
    }
}
