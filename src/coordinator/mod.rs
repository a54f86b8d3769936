//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Node registry and liveness (heartbeats + periodic sweep)
//! - Placement decisions for new uploads
//! - File → node and user → files bookkeeping
//!
//! All of it lives in memory behind a single lock.

pub mod client;
pub mod placement;
pub mod registry;
pub mod server;

pub use client::CoordinatorClient;
pub use registry::ClusterState;
pub use server::Coordinator;
