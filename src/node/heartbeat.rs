//! Periodic heartbeat from a storage node to the coordinator

use crate::common::Error;
use crate::coordinator::CoordinatorClient;
use crate::node::server::SharedStore;
use std::time::Duration;

/// What the node announces about itself
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
}

/// Send `{node_id, used_storage}` every `interval`.
///
/// Failures are logged and retried at the next tick with no backoff. If the
/// coordinator no longer knows this node (it restarted and lost its
/// in-memory registry), the node registers again under the same id.
pub fn start_heartbeat(
    client: CoordinatorClient,
    identity: NodeIdentity,
    store: SharedStore,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // registration just happened, skip the immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let (used, capacity) = match store.lock() {
                Ok(store) => (store.used_bytes(), store.capacity_bytes()),
                Err(_) => {
                    tracing::error!("Blob store lock poisoned, stopping heartbeat");
                    return;
                }
            };

            match client.heartbeat(&identity.node_id, used).await {
                Ok(()) => tracing::debug!("Heartbeat sent (used {} bytes)", used),
                Err(Error::Registration(msg)) => {
                    tracing::warn!("Coordinator forgot this node ({}), registering again", msg);
                    let res = client
                        .register_node(
                            Some(identity.node_id.clone()),
                            identity.ip.clone(),
                            identity.port,
                            capacity,
                            used,
                        )
                        .await;
                    if let Err(e) = res {
                        tracing::warn!("Re-registration failed: {}", e);
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Heartbeat failed, retrying next tick: {}", e)
                }
                Err(e) => tracing::error!("Heartbeat rejected: {}", e),
            }
        }
    })
}
