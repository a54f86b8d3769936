//! Control messages for the coordinator and storage-node request surfaces
//!
//! Requests are JSON objects tagged by `type`. Both surfaces answer with the
//! same [`Response`] record: a `status` plus whichever payload fields the
//! request kind produces.

use crate::common::error::{Error, ErrorKind, Result};
use crate::common::types::{FileMetadata, NodeRecord};
use serde::{Deserialize, Serialize};

/// Requests understood by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordRequest {
    RegisterNode {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        ip: String,
        port: u16,
        #[serde(default)]
        storage_capacity: u64,
        #[serde(default)]
        used_storage: u64,
    },
    Heartbeat {
        node_id: String,
        #[serde(default)]
        used_storage: u64,
    },
    GetAvailableNodes {},
    RegisterFile {
        file_id: String,
        #[serde(default)]
        node_ids: Vec<String>,
        user_id: String,
        file_info: FileMetadata,
    },
    GetFileLocations {
        file_id: String,
    },
    /// Placement query: which node should receive `file_size` bytes
    UploadRequest {
        file_size: u64,
    },
    /// Location query for a download
    DownloadRequest {
        file_id: String,
    },
    GetUserFiles {
        user_id: String,
    },
    DeleteFile {
        file_id: String,
        user_id: String,
    },
}

impl CoordRequest {
    /// Wire name of the request, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CoordRequest::RegisterNode { .. } => "register_node",
            CoordRequest::Heartbeat { .. } => "heartbeat",
            CoordRequest::GetAvailableNodes {} => "get_available_nodes",
            CoordRequest::RegisterFile { .. } => "register_file",
            CoordRequest::GetFileLocations { .. } => "get_file_locations",
            CoordRequest::UploadRequest { .. } => "upload_request",
            CoordRequest::DownloadRequest { .. } => "download_request",
            CoordRequest::GetUserFiles { .. } => "get_user_files",
            CoordRequest::DeleteFile { .. } => "delete_file",
        }
    }
}

/// Requests understood by a storage node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeRequest {
    /// Followed by a payload of exactly `file_size` bytes once the node
    /// answers `ready`
    Upload {
        file_id: String,
        file_name: String,
        file_size: u64,
    },
    Download {
        file_id: String,
    },
    Delete {
        file_id: String,
    },
    /// Download acknowledgment: the client is ready for the payload
    Ready {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    /// Upload accepted, the node is waiting for the payload
    Ready,
}

/// Reply record for every request kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_info: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileMetadata>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
}

impl Response {
    fn with_status(status: Status) -> Self {
        Self {
            status,
            message: None,
            error: None,
            node_id: None,
            node_info: None,
            node: None,
            nodes: None,
            files: None,
            file_size: None,
            bytes_received: None,
        }
    }

    pub fn success() -> Self {
        Self::with_status(Status::Success)
    }

    pub fn ready() -> Self {
        Self::with_status(Status::Ready)
    }

    pub fn from_error(err: &Error) -> Self {
        Self {
            message: Some(err.reply_message()),
            error: Some(err.kind()),
            ..Self::with_status(Status::Error)
        }
    }

    pub fn registered(node: NodeRecord) -> Self {
        Self {
            node_id: Some(node.node_id.clone()),
            node_info: Some(node),
            ..Self::success()
        }
    }

    pub fn with_node(node: NodeRecord) -> Self {
        Self {
            node: Some(node),
            ..Self::success()
        }
    }

    pub fn with_nodes(nodes: Vec<NodeRecord>) -> Self {
        Self {
            nodes: Some(nodes),
            ..Self::success()
        }
    }

    pub fn with_files(files: Vec<FileMetadata>) -> Self {
        Self {
            files: Some(files),
            ..Self::success()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Turn an error reply into a typed error
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Error => Err(Error::from_reply(self.error, self.message)),
            _ => Ok(self),
        }
    }

    /// Fail unless the reply has the expected status
    pub fn expect_status(self, expected: Status) -> Result<Self> {
        let resp = self.into_result()?;
        if resp.status != expected {
            return Err(Error::Protocol(format!(
                "expected {:?} reply, got {:?}",
                expected, resp.status
            )));
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_tagging() {
        let req: CoordRequest = serde_json::from_value(json!({
            "type": "heartbeat",
            "node_id": "n1",
            "used_storage": 42
        }))
        .unwrap();
        assert_eq!(
            req,
            CoordRequest::Heartbeat {
                node_id: "n1".into(),
                used_storage: 42
            }
        );

        let req: CoordRequest =
            serde_json::from_value(json!({ "type": "get_available_nodes" })).unwrap();
        assert_eq!(req.kind(), "get_available_nodes");
    }

    #[test]
    fn test_unknown_request_type_is_rejected() {
        let res: std::result::Result<CoordRequest, _> =
            serde_json::from_value(json!({ "type": "format_disk" }));
        assert!(res.is_err());

        let res: std::result::Result<NodeRequest, _> =
            serde_json::from_value(json!({ "file_id": "x" }));
        assert!(res.is_err());
    }

    #[test]
    fn test_register_node_without_id() {
        let req: CoordRequest = serde_json::from_value(json!({
            "type": "register_node",
            "ip": "10.0.0.2",
            "port": 10002,
            "storage_capacity": 1024
        }))
        .unwrap();
        match req {
            CoordRequest::RegisterNode {
                node_id,
                used_storage,
                ..
            } => {
                assert!(node_id.is_none());
                assert_eq!(used_storage, 0);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_error_reply_round_trips_kind() {
        let reply = Response::from_error(&Error::NotFound("file abc".into()));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["message"], "file abc");
        assert!(json.get("nodes").is_none());

        let decoded: Response = serde_json::from_value(json).unwrap();
        assert!(matches!(decoded.into_result(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_expect_status() {
        assert!(Response::ready().expect_status(Status::Ready).is_ok());
        assert!(matches!(
            Response::success().expect_status(Status::Ready),
            Err(Error::Protocol(_))
        ));
    }
}
