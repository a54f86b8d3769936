//! Storage node implementation
//!
//! Holds blobs for one capacity slice of the cluster:
//! - Plain files in a local directory, one per file_id
//! - Usage recomputed from disk at startup
//! - Registration plus periodic heartbeats to the coordinator
//! - Upload / download / delete over length-prefixed frames

pub mod client;
pub mod heartbeat;
pub mod server;
pub mod store;

pub use client::NodeClient;
pub use server::{NodeHandle, StorageNode};
pub use store::BlobStore;
