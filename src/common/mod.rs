//! Common utilities and types shared across minifs

pub mod config;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod types;
pub mod utils;

pub use config::{Config, CoordinatorConfig, NodeConfig};
pub use error::{Error, ErrorKind, Result};
pub use messages::{CoordRequest, NodeRequest, Response, Status};
pub use protocol::{CHUNK_SIZE, MAX_FRAME_LEN};
pub use types::{FileMetadata, NodeRecord, NodeStatus};
pub use utils::{format_bytes, generate_node_id, parse_duration, timestamp_now_millis, validate_file_id};
