//! In-memory cluster state held by the coordinator
//!
//! Stores:
//! - Node registry (node_id → NodeRecord)
//! - File registry (file_id → node_ids holding a copy)
//! - User file index (user_id → FileMetadata list)
//!
//! Nothing here is persisted; a coordinator restart starts empty and nodes
//! reappear on their next registration.
//!
//! Timestamps are passed in explicitly (unix millis) so liveness rules can be
//! exercised without waiting on a clock.

use crate::common::{Error, FileMetadata, NodeRecord, NodeStatus, Result};
use crate::coordinator::placement;
use std::collections::{BTreeMap, HashMap};

/// Everything the coordinator knows, guarded as one unit by the server
#[derive(Debug, Default)]
pub struct ClusterState {
    nodes: BTreeMap<String, NodeRecord>,
    file_registry: HashMap<String, Vec<String>>,
    user_files: HashMap<String, Vec<FileMetadata>>,
}

/// Registration request fields
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    pub node_id: Option<String>,
    pub ip: String,
    pub port: u16,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    // === Node registry ===

    /// Store a node as online. A missing node_id is assigned here; an
    /// existing node_id is overwritten, keeping ids unique.
    pub fn register_node(&mut self, reg: NodeRegistration, now_ms: u64) -> NodeRecord {
        let node_id = reg
            .node_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let record = NodeRecord {
            node_id: node_id.clone(),
            ip: reg.ip,
            port: reg.port,
            capacity_bytes: reg.capacity_bytes,
            used_bytes: reg.used_bytes,
            last_heartbeat: now_ms,
            status: NodeStatus::Online,
        };
        self.nodes.insert(node_id, record.clone());
        record
    }

    /// Refresh liveness and usage for a registered node
    pub fn heartbeat(&mut self, node_id: &str, used_bytes: u64, now_ms: u64) -> Result<()> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| Error::Registration(format!("node {} is not registered", node_id)))?;

        node.last_heartbeat = now_ms;
        node.used_bytes = used_bytes;
        node.status = NodeStatus::Online;
        Ok(())
    }

    pub fn get_node(&self, node_id: &str) -> Option<&NodeRecord> {
        self.nodes.get(node_id)
    }

    /// All records, online or not
    pub fn all_nodes(&self) -> Vec<NodeRecord> {
        self.nodes.values().cloned().collect()
    }

    /// Online records only. Status is whatever the last sweep or heartbeat
    /// left; it is not recomputed here.
    pub fn list_available_nodes(&self) -> Vec<NodeRecord> {
        self.nodes
            .values()
            .filter(|n| n.status.is_online())
            .cloned()
            .collect()
    }

    /// Pick the online node with the most free space that fits `file_size`
    pub fn select_placement_node(&self, file_size: u64) -> Result<NodeRecord> {
        placement::select_node(self.nodes.values(), file_size).cloned()
    }

    /// Mark online nodes silent for longer than `timeout_ms` as offline.
    /// Returns the ids that changed state.
    pub fn sweep_expired(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<String> {
        let mut expired = Vec::new();
        for node in self.nodes.values_mut() {
            if node.status.is_online() && now_ms.saturating_sub(node.last_heartbeat) > timeout_ms
            {
                node.status = NodeStatus::Offline;
                expired.push(node.node_id.clone());
            }
        }
        expired
    }

    // === File registry ===

    /// Append replica locations and the user's metadata. Repeating the call
    /// for the same file_id appends again; deduplication is up to the caller.
    pub fn register_file(
        &mut self,
        file_id: &str,
        node_ids: Vec<String>,
        user_id: &str,
        metadata: FileMetadata,
    ) {
        self.file_registry
            .entry(file_id.to_string())
            .or_default()
            .extend(node_ids);
        self.user_files
            .entry(user_id.to_string())
            .or_default()
            .push(metadata);
    }

    /// Online nodes listed for `file_id`, in registration order.
    /// Unknown file ids are NotFound; a known file whose nodes are all
    /// offline yields an empty list.
    pub fn get_file_locations(&self, file_id: &str) -> Result<Vec<NodeRecord>> {
        let node_ids = self
            .file_registry
            .get(file_id)
            .ok_or_else(|| Error::NotFound(format!("file {} is not registered", file_id)))?;

        Ok(node_ids
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.status.is_online())
            .cloned()
            .collect())
    }

    /// Raw replica list, duplicates included
    pub fn file_replicas(&self, file_id: &str) -> Option<&[String]> {
        self.file_registry.get(file_id).map(Vec::as_slice)
    }

    pub fn get_user_files(&self, user_id: &str) -> Vec<FileMetadata> {
        self.user_files.get(user_id).cloned().unwrap_or_default()
    }

    /// Drop the file's registry entry and strip it from the user's listing.
    /// Blobs on storage nodes are left alone.
    pub fn delete_file(&mut self, file_id: &str, user_id: &str) {
        self.file_registry.remove(file_id);
        if let Some(files) = self.user_files.get_mut(user_id) {
            files.retain(|f| f.file_id != file_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registration(id: &str, capacity: u64, used: u64) -> NodeRegistration {
        NodeRegistration {
            node_id: Some(id.to_string()),
            ip: "127.0.0.1".to_string(),
            port: 10000,
            capacity_bytes: capacity,
            used_bytes: used,
        }
    }

    fn metadata(file_id: &str) -> FileMetadata {
        FileMetadata {
            file_id: file_id.to_string(),
            file_name: format!("{}.pdf", file_id),
            file_size: 10,
            upload_time: Utc::now(),
        }
    }

    #[test]
    fn test_register_assigns_missing_id() {
        let mut state = ClusterState::new();
        let reg = NodeRegistration {
            node_id: None,
            ..registration("unused", 10, 0)
        };
        let record = state.register_node(reg, 1_000);
        assert!(!record.node_id.is_empty());
        assert_eq!(record.status, NodeStatus::Online);
        assert_eq!(record.last_heartbeat, 1_000);
        assert!(state.get_node(&record.node_id).is_some());
    }

    #[test]
    fn test_reregistration_keeps_ids_unique() {
        let mut state = ClusterState::new();
        state.register_node(registration("a", 10, 1), 0);
        state.register_node(registration("a", 20, 2), 5);
        let nodes = state.all_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].capacity_bytes, 20);
    }

    #[test]
    fn test_heartbeat_unknown_node_mutates_nothing() {
        let mut state = ClusterState::new();
        state.register_node(registration("a", 10, 1), 0);

        let res = state.heartbeat("ghost", 5, 100);
        assert!(matches!(res, Err(Error::Registration(_))));

        let nodes = state.all_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].used_bytes, 1);
        assert_eq!(nodes[0].last_heartbeat, 0);
    }

    #[test]
    fn test_sweep_then_heartbeat_revives() {
        let mut state = ClusterState::new();
        state.register_node(registration("a", 10, 0), 0);
        state.register_node(registration("b", 10, 0), 0);
        state.heartbeat("b", 3, 25_000).unwrap();

        // 30s is the boundary: not yet expired
        assert!(state.sweep_expired(30_000, 30_000).is_empty());

        let expired = state.sweep_expired(31_000, 30_000);
        assert_eq!(expired, vec!["a".to_string()]);
        let online: Vec<_> = state
            .list_available_nodes()
            .into_iter()
            .map(|n| n.node_id)
            .collect();
        assert_eq!(online, vec!["b".to_string()]);

        // already offline, not reported twice
        assert!(state.sweep_expired(40_000, 30_000).is_empty());

        state.heartbeat("a", 4, 41_000).unwrap();
        assert_eq!(state.list_available_nodes().len(), 2);
        assert_eq!(state.get_node("a").unwrap().used_bytes, 4);
    }

    #[test]
    fn test_offline_node_excluded_from_placement() {
        let mut state = ClusterState::new();
        state.register_node(registration("a", 100, 0), 0);
        state.register_node(registration("b", 10, 0), 20_000);

        assert_eq!(state.select_placement_node(5).unwrap().node_id, "a");
        state.sweep_expired(35_000, 30_000);
        assert_eq!(state.select_placement_node(5).unwrap().node_id, "b");
        assert!(matches!(
            state.select_placement_node(50),
            Err(Error::Capacity(_))
        ));
    }

    #[test]
    fn test_register_file_appends_duplicates() {
        let mut state = ClusterState::new();
        state.register_file("f1", vec!["a".into()], "u1", metadata("f1"));
        state.register_file("f1", vec!["a".into()], "u1", metadata("f1"));

        assert_eq!(
            state.file_replicas("f1").unwrap(),
            &["a".to_string(), "a".to_string()]
        );
        assert_eq!(state.get_user_files("u1").len(), 2);
    }

    #[test]
    fn test_file_locations_only_online() {
        let mut state = ClusterState::new();
        state.register_node(registration("a", 10, 0), 0);
        state.register_node(registration("b", 10, 0), 20_000);
        state.register_file("f1", vec!["a".into(), "b".into(), "zz".into()], "u1", metadata("f1"));

        assert_eq!(state.get_file_locations("f1").unwrap().len(), 2);
        state.sweep_expired(40_000, 30_000);
        let nodes = state.get_file_locations("f1").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, "b");

        assert!(matches!(
            state.get_file_locations("missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_file_only_touches_registries() {
        let mut state = ClusterState::new();
        state.register_node(registration("a", 10, 6), 0);
        state.register_file("f1", vec!["a".into()], "u1", metadata("f1"));
        state.register_file("f2", vec!["a".into()], "u1", metadata("f2"));

        state.delete_file("f1", "u1");

        assert!(state.file_replicas("f1").is_none());
        let files = state.get_user_files("u1");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_id, "f2");
        // node usage is only ever changed by the node itself
        assert_eq!(state.get_node("a").unwrap().used_bytes, 6);
    }

    #[test]
    fn test_user_files_unknown_user_is_empty() {
        let state = ClusterState::new();
        assert!(state.get_user_files("nobody").is_empty());
    }
}
