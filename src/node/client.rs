//! Client for a storage node's transfer surface
//!
//! Used by gateways to move bytes once the coordinator has named a node.
//! A transfer that fails midway is not resumable; retry it from the start.

use crate::common::protocol::{connect, read_frame, read_payload, write_frame, write_payload};
use crate::common::{Error, NodeRequest, Response, Result, Status};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone)]
pub struct NodeClient {
    addr: String,
    timeout: Option<Duration>,
}

impl NodeClient {
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

    /// Stream exactly `file_size` bytes from `source` into blob `file_id`.
    /// Returns the byte count the node acknowledged.
    pub async fn upload<R>(
        &self,
        file_id: &str,
        file_name: &str,
        source: &mut R,
        file_size: u64,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut stream = connect(&self.addr, self.timeout).await?;
        let request = NodeRequest::Upload {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            file_size,
        };
        write_frame(&mut stream, &request, self.timeout).await?;

        read_frame::<_, Response>(&mut stream, self.timeout)
            .await?
            .expect_status(Status::Ready)?;

        write_payload(source, &mut stream, file_size, self.timeout).await?;

        let done = read_frame::<_, Response>(&mut stream, self.timeout)
            .await?
            .expect_status(Status::Success)?;
        Ok(done.bytes_received.unwrap_or(file_size))
    }

    pub async fn upload_bytes(&self, file_id: &str, file_name: &str, data: &[u8]) -> Result<u64> {
        let mut source = data;
        self.upload(file_id, file_name, &mut source, data.len() as u64)
            .await
    }

    /// Fetch blob `file_id` into `sink`, returning its size
    pub async fn download<W>(&self, file_id: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = connect(&self.addr, self.timeout).await?;
        let request = NodeRequest::Download {
            file_id: file_id.to_string(),
        };
        write_frame(&mut stream, &request, self.timeout).await?;

        let header = read_frame::<_, Response>(&mut stream, self.timeout)
            .await?
            .expect_status(Status::Success)?;
        let file_size = header
            .file_size
            .ok_or_else(|| Error::Protocol("download reply without file_size".into()))?;

        write_frame(&mut stream, &NodeRequest::Ready {}, self.timeout).await?;
        read_payload(&mut stream, sink, file_size, self.timeout).await
    }

    pub async fn download_bytes(&self, file_id: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.download(file_id, &mut buf).await?;
        Ok(buf)
    }

    /// Remove the blob from the node's disk
    pub async fn delete(&self, file_id: &str) -> Result<()> {
        let mut stream = connect(&self.addr, self.timeout).await?;
        let request = NodeRequest::Delete {
            file_id: file_id.to_string(),
        };
        write_frame(&mut stream, &request, self.timeout).await?;
        read_frame::<_, Response>(&mut stream, self.timeout)
            .await?
            .expect_status(Status::Success)?;
        Ok(())
    }
}
