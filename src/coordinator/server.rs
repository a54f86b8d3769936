//! Coordinator server
//!
//! One task per accepted connection, each answering a single request. The
//! number of live connection tasks is capped by `max_connections`; past the
//! cap the accept loop waits for a slot. A background task runs the liveness
//! sweep.

use crate::common::protocol::{read_frame, write_frame, ACCEPT_BACKOFF};
use crate::common::{
    format_bytes, timestamp_now_millis, CoordRequest, CoordinatorConfig, Error, Response, Result,
};
use crate::coordinator::registry::{ClusterState, NodeRegistration};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Shared handle to the coordinator's state
pub type SharedState = Arc<Mutex<ClusterState>>;

pub struct Coordinator {
    config: CoordinatorConfig,
    handler: RequestHandler,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            handler: RequestHandler::new(Arc::new(Mutex::new(ClusterState::new()))),
        }
    }

    /// Handle on the live state, for inspection
    pub fn state(&self) -> SharedState {
        self.handler.state.clone()
    }

    /// Bind the configured address and serve until the process exits.
    /// Failing to bind is the only fatal error.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        self.config.validate()?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Starting coordinator");
        tracing::info!("  Listening on: {}", local_addr);
        tracing::info!("  Heartbeat timeout: {:?}", self.config.heartbeat_timeout());
        tracing::info!("  Sweep interval: {:?}", self.config.sweep_interval());
        tracing::info!("  Max connections: {}", self.config.max_connections);

        let sweep = start_liveness_sweep(
            self.handler.state.clone(),
            self.config.sweep_interval(),
            self.config.heartbeat_timeout(),
        );

        let limiter = Arc::new(Semaphore::new(self.config.max_connections));
        let io_timeout = self.config.io_timeout();

        tracing::info!("✓ Coordinator ready");

        let result: Result<()> = async {
            loop {
                let permit = limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Internal("connection limiter closed".into()))?;

                let (stream, peer) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("Error accepting connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };

                let handler = self.handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handler.serve_connection(stream, peer, io_timeout).await {
                        tracing::warn!("Connection error from {}: {}", peer, e);
                    }
                });
            }
        }
        .await;

        sweep.abort();
        result
    }
}

/// Applies coordinator requests to the cluster state
#[derive(Clone)]
pub struct RequestHandler {
    state: SharedState,
}

impl RequestHandler {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ClusterState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("cluster state lock poisoned".into()))
    }

    /// Read one request, answer it, close. Undecodable requests still get
    /// an error reply; transport failures do not.
    async fn serve_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        io_timeout: Option<Duration>,
    ) -> Result<()> {
        let response = match read_frame::<_, CoordRequest>(&mut stream, io_timeout).await {
            Ok(request) => {
                tracing::debug!("{} from {}", request.kind(), peer);
                self.handle(request)
                    .unwrap_or_else(|e| Response::from_error(&e))
            }
            Err(e @ Error::Protocol(_)) => {
                tracing::warn!("Rejected request from {}: {}", peer, e);
                Response::from_error(&e)
            }
            Err(e) => return Err(e),
        };

        write_frame(&mut stream, &response, io_timeout).await
    }

    /// Apply one request under the state lock
    pub fn handle(&self, request: CoordRequest) -> Result<Response> {
        let now = timestamp_now_millis();
        let mut state = self.lock()?;

        match request {
            CoordRequest::RegisterNode {
                node_id,
                ip,
                port,
                storage_capacity,
                used_storage,
            } => {
                let record = state.register_node(
                    NodeRegistration {
                        node_id,
                        ip,
                        port,
                        capacity_bytes: storage_capacity,
                        used_bytes: used_storage,
                    },
                    now,
                );
                tracing::info!(
                    "Node registered: {} at {} (capacity {}, used {})",
                    record.node_id,
                    record.address(),
                    format_bytes(record.capacity_bytes),
                    format_bytes(record.used_bytes)
                );
                Ok(Response::registered(record))
            }

            CoordRequest::Heartbeat {
                node_id,
                used_storage,
            } => {
                state.heartbeat(&node_id, used_storage, now)?;
                tracing::debug!("Heartbeat from {} (used {})", node_id, format_bytes(used_storage));
                Ok(Response::success())
            }

            CoordRequest::GetAvailableNodes {} => {
                Ok(Response::with_nodes(state.list_available_nodes()))
            }

            CoordRequest::RegisterFile {
                file_id,
                node_ids,
                user_id,
                file_info,
            } => {
                tracing::info!(
                    "File registered: {} ({}, {}) on [{}]",
                    file_info.file_name,
                    file_id,
                    format_bytes(file_info.file_size),
                    node_ids.join(", ")
                );
                state.register_file(&file_id, node_ids, &user_id, file_info);
                Ok(Response::success())
            }

            CoordRequest::GetFileLocations { file_id }
            | CoordRequest::DownloadRequest { file_id } => {
                Ok(Response::with_nodes(state.get_file_locations(&file_id)?))
            }

            CoordRequest::UploadRequest { file_size } => {
                let node = state.select_placement_node(file_size)?;
                tracing::info!(
                    "Upload of {} assigned to {}",
                    format_bytes(file_size),
                    node.node_id
                );
                Ok(Response::with_node(node))
            }

            CoordRequest::GetUserFiles { user_id } => {
                Ok(Response::with_files(state.get_user_files(&user_id)))
            }

            CoordRequest::DeleteFile { file_id, user_id } => {
                state.delete_file(&file_id, &user_id);
                tracing::info!("File deleted: {} (user {})", file_id, user_id);
                Ok(Response::success())
            }
        }
    }
}

/// Periodically flip silent nodes offline. Liveness is push-based: the
/// coordinator never contacts nodes, it only notices missing heartbeats.
pub fn start_liveness_sweep(
    state: SharedState,
    interval: Duration,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let expired = match state.lock() {
                Ok(mut guard) => {
                    guard.sweep_expired(timestamp_now_millis(), timeout.as_millis() as u64)
                }
                Err(_) => {
                    tracing::error!("Cluster state lock poisoned, stopping liveness sweep");
                    return;
                }
            };

            for node_id in expired {
                tracing::warn!("Node offline: {} (no heartbeat for {:?})", node_id, timeout);
            }
        }
    })
}
