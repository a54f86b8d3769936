//! Configuration for minifs components
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file
//! (`minifs.toml` or an explicit path), `MINIFS__*` environment variables.
//! Binaries apply their command-line flags on top.

use crate::common::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level, used when RUST_LOG is not set
    pub log_level: String,

    pub coordinator: CoordinatorConfig,

    pub node: NodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            coordinator: CoordinatorConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Listen address for node and gateway requests
    pub bind_addr: SocketAddr,

    /// A node whose last heartbeat is older than this goes offline
    pub heartbeat_timeout_ms: u64,

    /// Period of the liveness sweep
    pub sweep_interval_ms: u64,

    /// Deadline for each socket read/write on a request connection.
    /// 0 disables it.
    pub io_timeout_ms: u64,

    /// Connections served at once; the accept loop waits beyond this
    pub max_connections: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            heartbeat_timeout_ms: 30_000,
            sweep_interval_ms: 10_000,
            io_timeout_ms: 30_000,
            max_connections: 512,
        }
    }
}

impl CoordinatorConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(Error::InvalidConfig("sweep_interval_ms must be > 0".into()));
        }
        if self.heartbeat_timeout_ms <= self.sweep_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "heartbeat_timeout_ms ({}) must exceed sweep_interval_ms ({})",
                self.heartbeat_timeout_ms, self.sweep_interval_ms
            )));
        }
        if self.max_connections == 0 {
            return Err(Error::InvalidConfig("max_connections must be > 0".into()));
        }
        Ok(())
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Generated at startup when absent
    pub node_id: Option<String>,

    /// Listen address for transfer requests
    pub bind_addr: SocketAddr,

    /// IP announced to the coordinator. Defaults to the bound IP, or
    /// loopback when bound to an unspecified address.
    pub advertise_ip: Option<String>,

    /// Coordinator to register and heartbeat with
    pub coordinator_addr: String,

    /// Blob directory; `./node_storage/<node_id>` when absent
    pub storage_path: Option<PathBuf>,

    /// Bytes this node offers to the cluster
    pub capacity_bytes: u64,

    pub heartbeat_interval_ms: u64,

    /// Deadline for each socket read/write while serving a request.
    /// 0 disables it, letting a stalled sender hold its task indefinitely.
    pub io_timeout_ms: u64,

    pub max_connections: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 10000)),
            advertise_ip: None,
            coordinator_addr: "127.0.0.1:9000".to_string(),
            storage_path: None,
            capacity_bytes: 5 * 1024 * 1024 * 1024,
            heartbeat_interval_ms: 10_000,
            io_timeout_ms: 30_000,
            max_connections: 128,
        }
    }
}

impl NodeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }

    /// Storage directory for the given node id
    pub fn storage_dir(&self, node_id: &str) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(|| Path::new("./node_storage").join(node_id))
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity_bytes == 0 {
            return Err(Error::InvalidConfig("capacity_bytes must be > 0".into()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "heartbeat_interval_ms must be > 0".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(Error::InvalidConfig("max_connections must be > 0".into()));
        }
        if self.coordinator_addr.trim().is_empty() {
            return Err(Error::InvalidConfig("coordinator_addr is empty".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load `minifs.toml` from the working directory if present, then the
    /// environment
    pub fn load() -> Result<Self> {
        Self::build(config::File::with_name("minifs").required(false))
    }

    /// Load an explicit config file, then the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("MINIFS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let coord = CoordinatorConfig::default();
        assert_eq!(coord.bind_addr.port(), 9000);
        assert_eq!(coord.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(coord.sweep_interval(), Duration::from_secs(10));
        assert!(coord.validate().is_ok());

        let node = NodeConfig::default();
        assert_eq!(node.capacity_bytes, 5 * 1024 * 1024 * 1024);
        assert_eq!(node.io_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            node.storage_dir("ab12cd34"),
            PathBuf::from("./node_storage/ab12cd34")
        );
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_zero_io_timeout_disables_deadline() {
        let node = NodeConfig {
            io_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(node.io_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let coord = CoordinatorConfig {
            heartbeat_timeout_ms: 5_000,
            sweep_interval_ms: 10_000,
            ..Default::default()
        };
        assert!(coord.validate().is_err());

        let node = NodeConfig {
            capacity_bytes: 0,
            ..Default::default()
        };
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[coordinator]
bind_addr = "127.0.0.1:9100"
heartbeat_timeout_ms = 60000

[node]
node_id = "node-7"
capacity_bytes = 1048576
coordinator_addr = "10.0.0.1:9100"
"#
        )
        .unwrap();

        let cfg = Config::load_from(file.path()).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.coordinator.bind_addr.port(), 9100);
        assert_eq!(cfg.coordinator.heartbeat_timeout_ms, 60_000);
        assert_eq!(cfg.coordinator.sweep_interval_ms, 10_000);
        assert_eq!(cfg.node.node_id.as_deref(), Some("node-7"));
        assert_eq!(cfg.node.capacity_bytes, 1_048_576);
        assert_eq!(cfg.node.coordinator_addr, "10.0.0.1:9100");
    }
}
