//! Client for the coordinator's request surface
//!
//! Each call opens a fresh TCP connection, sends one request frame and reads
//! one reply frame. Error replies come back as typed [`Error`]s.

use crate::common::protocol::{connect, read_frame, write_frame};
use crate::common::{CoordRequest, Error, FileMetadata, NodeRecord, Response, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    addr: String,
    timeout: Option<Duration>,
}

impl CoordinatorClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
        }
    }

    /// Bound connect and each read/write by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and return the raw reply, error replies included
    pub async fn send(&self, request: &CoordRequest) -> Result<Response> {
        let mut stream = connect(&self.addr, self.timeout).await?;
        write_frame(&mut stream, request, self.timeout).await?;
        read_frame(&mut stream, self.timeout).await
    }

    async fn call(&self, request: CoordRequest) -> Result<Response> {
        self.send(&request).await?.into_result()
    }

    /// Register a node; returns the stored record, including the node_id the
    /// coordinator settled on
    pub async fn register_node(
        &self,
        node_id: Option<String>,
        ip: impl Into<String>,
        port: u16,
        capacity_bytes: u64,
        used_bytes: u64,
    ) -> Result<NodeRecord> {
        let resp = self
            .call(CoordRequest::RegisterNode {
                node_id,
                ip: ip.into(),
                port,
                storage_capacity: capacity_bytes,
                used_storage: used_bytes,
            })
            .await?;
        resp.node_info
            .ok_or_else(|| Error::Protocol("register reply without node_info".into()))
    }

    pub async fn heartbeat(&self, node_id: &str, used_bytes: u64) -> Result<()> {
        self.call(CoordRequest::Heartbeat {
            node_id: node_id.to_string(),
            used_storage: used_bytes,
        })
        .await?;
        Ok(())
    }

    pub async fn available_nodes(&self) -> Result<Vec<NodeRecord>> {
        let resp = self.call(CoordRequest::GetAvailableNodes {}).await?;
        Ok(resp.nodes.unwrap_or_default())
    }

    /// Ask where an upload of `file_size` bytes should go
    pub async fn upload_request(&self, file_size: u64) -> Result<NodeRecord> {
        let resp = self.call(CoordRequest::UploadRequest { file_size }).await?;
        resp.node
            .ok_or_else(|| Error::Protocol("upload reply without node".into()))
    }

    pub async fn register_file(
        &self,
        file_id: &str,
        node_ids: Vec<String>,
        user_id: &str,
        file_info: FileMetadata,
    ) -> Result<()> {
        self.call(CoordRequest::RegisterFile {
            file_id: file_id.to_string(),
            node_ids,
            user_id: user_id.to_string(),
            file_info,
        })
        .await?;
        Ok(())
    }

    pub async fn file_locations(&self, file_id: &str) -> Result<Vec<NodeRecord>> {
        let resp = self
            .call(CoordRequest::GetFileLocations {
                file_id: file_id.to_string(),
            })
            .await?;
        Ok(resp.nodes.unwrap_or_default())
    }

    pub async fn download_request(&self, file_id: &str) -> Result<Vec<NodeRecord>> {
        let resp = self
            .call(CoordRequest::DownloadRequest {
                file_id: file_id.to_string(),
            })
            .await?;
        Ok(resp.nodes.unwrap_or_default())
    }

    pub async fn user_files(&self, user_id: &str) -> Result<Vec<FileMetadata>> {
        let resp = self
            .call(CoordRequest::GetUserFiles {
                user_id: user_id.to_string(),
            })
            .await?;
        Ok(resp.files.unwrap_or_default())
    }

    /// Remove the file from the coordinator's registries only
    pub async fn delete_file(&self, file_id: &str, user_id: &str) -> Result<()> {
        self.call(CoordRequest::DeleteFile {
            file_id: file_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(())
    }
}
