//! Loopback cluster helpers shared by the integration tests

#![allow(dead_code)]

use minifs::common::{CoordinatorConfig, NodeConfig};
use minifs::coordinator::server::SharedState;
use minifs::coordinator::CoordinatorClient;
use minifs::node::{NodeHandle, StorageNode};
use minifs::Coordinator;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestCoordinator {
    pub addr: String,
    pub state: SharedState,
    task: JoinHandle<minifs::Result<()>>,
}

impl TestCoordinator {
    pub fn client(&self) -> CoordinatorClient {
        CoordinatorClient::new(self.addr.clone()).with_timeout(Some(Duration::from_secs(5)))
    }
}

impl Drop for TestCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn start_coordinator() -> TestCoordinator {
    start_coordinator_with(CoordinatorConfig::default()).await
}

pub async fn start_coordinator_with(config: CoordinatorConfig) -> TestCoordinator {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let coord = Coordinator::new(config);
    let state = coord.state();
    let task = tokio::spawn(coord.serve_with_listener(listener));
    TestCoordinator { addr, state, task }
}

pub struct TestNode {
    pub handle: NodeHandle,
    pub dir: TempDir,
}

impl TestNode {
    pub fn addr(&self) -> String {
        self.handle.local_addr().to_string()
    }
}

pub fn node_config(coordinator_addr: &str, dir: &TempDir, capacity_bytes: u64) -> NodeConfig {
    NodeConfig {
        coordinator_addr: coordinator_addr.to_string(),
        storage_path: Some(dir.path().to_path_buf()),
        capacity_bytes,
        io_timeout_ms: 5_000,
        ..Default::default()
    }
}

pub async fn start_node(coordinator_addr: &str, node_id: &str, capacity_bytes: u64) -> TestNode {
    let dir = TempDir::new().unwrap();
    let mut config = node_config(coordinator_addr, &dir, capacity_bytes);
    config.node_id = Some(node_id.to_string());
    start_node_with(config, dir).await
}

pub async fn start_node_with(config: NodeConfig, dir: TempDir) -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = StorageNode::open(config)
        .unwrap()
        .start(listener)
        .await
        .unwrap();
    TestNode { handle, dir }
}
