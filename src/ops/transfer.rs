//! Gateway-side file operations
//!
//! The coordinator only tracks metadata; these helpers do what a gateway
//! does around it: ask for placement, move bytes with the chosen node
//! directly, then record the result. Nothing here is transactional. A
//! failure between a finished upload and `register_file` leaves an orphaned
//! blob on the node.

use crate::common::{Error, FileMetadata, Result};
use crate::coordinator::CoordinatorClient;
use crate::node::NodeClient;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone)]
pub struct PutReport {
    pub file_id: String,
    pub node_id: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveReport {
    pub blobs_deleted: usize,
    pub blob_failures: usize,
}

/// Upload `file_size` bytes from `source` as a new file owned by `user_id`
pub async fn put_file<R>(
    coordinator: &CoordinatorClient,
    user_id: &str,
    file_name: &str,
    source: &mut R,
    file_size: u64,
    timeout: Option<Duration>,
) -> Result<PutReport>
where
    R: AsyncRead + Unpin,
{
    let file_id = uuid::Uuid::new_v4().to_string();
    let node = coordinator.upload_request(file_size).await?;
    tracing::info!("Uploading {} as {} to node {}", file_name, file_id, node.node_id);

    let bytes = NodeClient::new(node.address())
        .with_timeout(timeout)
        .upload(&file_id, file_name, source, file_size)
        .await?;

    let metadata = FileMetadata {
        file_id: file_id.clone(),
        file_name: file_name.to_string(),
        file_size,
        upload_time: Utc::now(),
    };
    if let Err(e) = coordinator
        .register_file(&file_id, vec![node.node_id.clone()], user_id, metadata)
        .await
    {
        tracing::warn!(
            "Blob {} stored on {} but not registered: {}",
            file_id,
            node.node_id,
            e
        );
        return Err(e);
    }

    Ok(PutReport {
        file_id,
        node_id: node.node_id,
        bytes,
    })
}

/// Download `file_id` from the first online node that holds it
pub async fn get_file<W>(
    coordinator: &CoordinatorClient,
    file_id: &str,
    sink: &mut W,
    timeout: Option<Duration>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let nodes = coordinator.download_request(file_id).await?;
    let node = nodes
        .first()
        .ok_or_else(|| Error::NotFound(format!("no online node holds {}", file_id)))?;

    tracing::info!("Downloading {} from node {}", file_id, node.node_id);
    NodeClient::new(node.address())
        .with_timeout(timeout)
        .download(file_id, sink)
        .await
}

/// Delete the blob from every online node listed for it, then drop the
/// coordinator's records. Offline holders keep their copy.
pub async fn remove_file(
    coordinator: &CoordinatorClient,
    file_id: &str,
    user_id: &str,
    timeout: Option<Duration>,
) -> Result<RemoveReport> {
    let mut nodes = coordinator.file_locations(file_id).await?;
    // the registry may list a node more than once
    let mut seen = HashSet::new();
    nodes.retain(|n| seen.insert(n.node_id.clone()));

    let mut report = RemoveReport::default();
    for node in nodes {
        let res = NodeClient::new(node.address())
            .with_timeout(timeout)
            .delete(file_id)
            .await;
        match res {
            Ok(()) => report.blobs_deleted += 1,
            Err(e) => {
                tracing::warn!("Could not delete {} on {}: {}", file_id, node.node_id, e);
                report.blob_failures += 1;
            }
        }
    }

    coordinator.delete_file(file_id, user_id).await?;
    Ok(report)
}
