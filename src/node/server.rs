//! Storage node server
//!
//! Startup: measure the storage directory, register with the coordinator
//! (startup aborts if that fails), then heartbeat in the background while
//! serving `upload` / `download` / `delete` requests, one task per
//! connection up to `max_connections`.

use crate::common::protocol::{
    read_frame, read_payload, write_frame, write_payload, ACCEPT_BACKOFF,
};
use crate::common::{
    format_bytes, generate_node_id, validate_file_id, Error, NodeConfig, NodeRequest, Response,
    Result,
};
use crate::coordinator::CoordinatorClient;
use crate::node::heartbeat::{start_heartbeat, NodeIdentity};
use crate::node::store::BlobStore;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Store shared between request tasks and the heartbeat
pub type SharedStore = Arc<Mutex<BlobStore>>;

pub struct StorageNode {
    config: NodeConfig,
    node_id: String,
    store: SharedStore,
}

impl StorageNode {
    /// Open the storage directory. Nothing touches the network yet.
    pub fn open(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let node_id = config.node_id.clone().unwrap_or_else(generate_node_id);
        let storage_dir = config.storage_dir(&node_id);
        let store = BlobStore::open(&storage_dir, config.capacity_bytes)?;

        Ok(Self {
            config,
            node_id,
            store: Arc::new(Mutex::new(store)),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Bind, register and serve until the process exits
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.start(listener).await?.wait().await
    }

    /// Register with the coordinator and start serving on `listener`.
    /// Returns once the node is registered and accepting connections.
    pub async fn start(self, listener: TcpListener) -> Result<NodeHandle> {
        let local_addr = listener.local_addr()?;
        let ip = advertised_ip(&self.config, local_addr);
        let coordinator = CoordinatorClient::new(self.config.coordinator_addr.clone())
            .with_timeout(self.config.io_timeout());

        let (capacity, used, root) = {
            let store = lock_store(&self.store)?;
            (store.capacity_bytes(), store.used_bytes(), store.root().to_path_buf())
        };

        let record = coordinator
            .register_node(
                Some(self.node_id.clone()),
                ip.clone(),
                local_addr.port(),
                capacity,
                used,
            )
            .await
            .map_err(|e| {
                Error::Registration(format!(
                    "failed to register with coordinator {}: {}",
                    coordinator.addr(),
                    e
                ))
            })?;
        let node_id = record.node_id;

        tracing::info!("Storage node running");
        tracing::info!("  Node ID: {}", node_id);
        tracing::info!("  Listening on: {} (advertised {}:{})", local_addr, ip, local_addr.port());
        tracing::info!("  Coordinator: {}", coordinator.addr());
        tracing::info!(
            "  Storage: {} / {} in {}",
            format_bytes(used),
            format_bytes(capacity),
            root.display()
        );

        let heartbeat = start_heartbeat(
            coordinator,
            NodeIdentity {
                node_id: node_id.clone(),
                ip,
                port: local_addr.port(),
            },
            self.store.clone(),
            self.config.heartbeat_interval(),
        );

        let service = NodeService {
            store: self.store.clone(),
            io_timeout: self.config.io_timeout(),
        };
        let server = tokio::spawn(accept_loop(listener, service, self.config.max_connections));

        Ok(NodeHandle {
            node_id,
            local_addr,
            store: self.store,
            heartbeat,
            server,
        })
    }
}

/// A registered, running storage node
pub struct NodeHandle {
    node_id: String,
    local_addr: SocketAddr,
    store: SharedStore,
    heartbeat: JoinHandle<()>,
    server: JoinHandle<Result<()>>,
}

impl NodeHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Stop heartbeating and accepting connections
    pub fn shutdown(&self) {
        self.heartbeat.abort();
        self.server.abort();
    }

    /// Run until the accept loop ends
    pub async fn wait(self) -> Result<()> {
        let result = self
            .server
            .await
            .map_err(|e| Error::Internal(format!("node server task failed: {}", e)))?;
        self.heartbeat.abort();
        result
    }
}

fn advertised_ip(config: &NodeConfig, local_addr: SocketAddr) -> String {
    match &config.advertise_ip {
        Some(ip) => ip.clone(),
        None if local_addr.ip().is_unspecified() => "127.0.0.1".to_string(),
        None => local_addr.ip().to_string(),
    }
}

fn lock_store(store: &SharedStore) -> Result<MutexGuard<'_, BlobStore>> {
    store
        .lock()
        .map_err(|_| Error::Internal("blob store lock poisoned".into()))
}

async fn accept_loop(
    listener: TcpListener,
    service: NodeService,
    max_connections: usize,
) -> Result<()> {
    let limiter = Arc::new(Semaphore::new(max_connections));
    loop {
        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("connection limiter closed".into()))?;

        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Server error: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let service = service.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = service.serve_connection(stream).await {
                tracing::warn!("Request from {} failed: {}", peer, e);
            }
        });
    }
}

/// Per-connection request handling
#[derive(Clone)]
struct NodeService {
    store: SharedStore,
    io_timeout: Option<Duration>,
}

impl NodeService {
    async fn serve_connection(&self, mut stream: TcpStream) -> Result<()> {
        let request = match read_frame::<_, NodeRequest>(&mut stream, self.io_timeout).await {
            Ok(request) => request,
            Err(e @ Error::Protocol(_)) => return self.reply(&mut stream, Err(e)).await,
            Err(e) => return Err(e),
        };

        match request {
            NodeRequest::Upload {
                file_id,
                file_name,
                file_size,
            } => {
                self.handle_upload(&mut stream, &file_id, &file_name, file_size)
                    .await
            }
            NodeRequest::Download { file_id } => self.handle_download(&mut stream, &file_id).await,
            NodeRequest::Delete { file_id } => {
                let outcome = self.handle_delete(&file_id);
                self.reply(&mut stream, outcome).await
            }
            NodeRequest::Ready {} => {
                let err = Error::Protocol("ready sent without a pending download".into());
                self.reply(&mut stream, Err(err)).await
            }
        }
    }

    /// Send a success reply or the error, then report the error to the caller
    async fn reply(&self, stream: &mut TcpStream, outcome: Result<Response>) -> Result<()> {
        match outcome {
            Ok(resp) => write_frame(stream, &resp, self.io_timeout).await,
            Err(e) => {
                write_frame(stream, &Response::from_error(&e), self.io_timeout).await?;
                Err(e)
            }
        }
    }

    async fn handle_upload(
        &self,
        stream: &mut TcpStream,
        file_id: &str,
        file_name: &str,
        file_size: u64,
    ) -> Result<()> {
        let prepared = validate_file_id(file_id).and_then(|_| {
            let mut store = lock_store(&self.store)?;
            let staging = store.staging_path(file_id)?;
            store.reserve(file_size)?;
            Ok(staging)
        });
        let staging = match prepared {
            Ok(path) => path,
            Err(e) => return self.reply(stream, Err(e)).await,
        };
        let mut reservation = Reservation {
            store: self.store.clone(),
            bytes: file_size,
        };

        let mut file = match tokio::fs::File::create(&staging).await {
            Ok(file) => file,
            Err(e) => return self.reply(stream, Err(e.into())).await,
        };

        tracing::info!("Receiving: {} ({})", file_name, format_bytes(file_size));
        write_frame(stream, &Response::ready(), self.io_timeout).await?;

        let received = async {
            let n = read_payload(stream, &mut file, file_size, self.io_timeout).await?;
            file.sync_all().await?;
            Ok::<_, Error>(n)
        }
        .await;

        let received = match received {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                discard_staging(&staging).await;
                // a bad length header arrives before any body byte, the
                // sender is still listening
                if let Error::Protocol(_) = e {
                    return self.reply(stream, Err(e)).await;
                }
                return Err(e);
            }
        };

        let committed = lock_store(&self.store).and_then(|mut store| {
            reservation.settle(&mut store);
            store.commit_upload(&staging, file_id, file_name, received)?;
            Ok((store.used_bytes(), store.capacity_bytes()))
        });
        let (used, capacity) = match committed {
            Ok(usage) => usage,
            Err(e) => {
                discard_staging(&staging).await;
                return self.reply(stream, Err(e)).await;
            }
        };

        tracing::info!(
            "Uploaded: {} | Storage: {} / {}",
            file_name,
            format_bytes(used),
            format_bytes(capacity)
        );

        let resp = Response {
            bytes_received: Some(received),
            ..Response::success()
        };
        write_frame(stream, &resp, self.io_timeout).await
    }

    async fn handle_download(&self, stream: &mut TcpStream, file_id: &str) -> Result<()> {
        let located = lock_store(&self.store).and_then(|store| {
            let (path, _) = store.locate(file_id)?;
            let uploaded = store.file_info(file_id).map(|f| f.upload_time);
            Ok((path, store.file_name(file_id), uploaded))
        });
        let (path, file_name, uploaded) = match located {
            Ok(found) => found,
            Err(e) => return self.reply(stream, Err(e)).await,
        };

        // the blob may vanish between locate and open if a delete races us
        let opened = match tokio::fs::File::open(&path).await {
            Ok(file) => file.metadata().await.map(|m| (file, m.len())),
            Err(e) => Err(e),
        };
        let (mut file, file_size) = match opened {
            Ok(opened) => opened,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let err = Error::NotFound(format!("File not found: {}", file_id));
                return self.reply(stream, Err(err)).await;
            }
            Err(e) => return self.reply(stream, Err(e.into())).await,
        };

        match uploaded {
            Some(at) => tracing::info!(
                "Sending: {} ({}, uploaded {})",
                file_name,
                format_bytes(file_size),
                at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => tracing::info!("Sending: {} ({})", file_name, format_bytes(file_size)),
        }

        let resp = Response {
            file_size: Some(file_size),
            ..Response::success()
        };
        write_frame(stream, &resp, self.io_timeout).await?;

        match read_frame::<_, NodeRequest>(stream, self.io_timeout).await? {
            NodeRequest::Ready {} => {}
            other => {
                return Err(Error::Protocol(format!(
                    "expected ready acknowledgment, got {:?}",
                    other
                )))
            }
        }

        write_payload(&mut file, stream, file_size, self.io_timeout).await?;
        tracing::info!("Sent: {}", file_name);
        Ok(())
    }

    fn handle_delete(&self, file_id: &str) -> Result<Response> {
        let mut store = lock_store(&self.store)?;
        let file_name = store.file_name(file_id);
        let freed = store.delete(file_id)?;
        tracing::info!("Deleted: {} ({} freed)", file_name, format_bytes(freed));
        Ok(Response::success())
    }
}

/// Capacity held for one in-flight upload. Dropping it without
/// [`Reservation::settle`] hands the bytes back, whichever way the upload
/// ended.
struct Reservation {
    store: SharedStore,
    bytes: u64,
}

impl Reservation {
    /// Release under a lock the caller already holds, just before commit
    fn settle(&mut self, store: &mut BlobStore) {
        store.release(self.bytes);
        self.bytes = 0;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.bytes == 0 {
            return;
        }
        match lock_store(&self.store) {
            Ok(mut store) => store.release(self.bytes),
            Err(e) => tracing::error!("Could not release {} reserved bytes: {}", self.bytes, e),
        }
    }
}

async fn discard_staging(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove partial upload {:?}: {}", path, e);
        }
    }
}
