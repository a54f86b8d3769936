//! # minifs
//!
//! A small distributed file store made of:
//! - A coordinator that tracks storage nodes, file locations and per-user
//!   file lists, all in memory
//! - Storage nodes that keep whole files on local disk and heartbeat to the
//!   coordinator
//! - Gateway helpers and a CLI that stream file bytes directly to and from
//!   the node the coordinator picks
//!
//! ## Architecture
//!
//! ```text
//!            ┌───────────────────────────┐
//!            │        Coordinator        │
//!            │  node registry, liveness, │
//!            │  placement, file index    │
//!            └──────▲─────────────▲──────┘
//!     register /    │             │  upload_request /
//!     heartbeat     │             │  register_file / ...
//!   ┌───────────────┴──┐      ┌───┴──────────┐
//!   │  Storage node    │◄─────┤   Gateway    │
//!   │  (blob directory)│ bytes│   / CLI      │
//!   └──────────────────┘      └──────────────┘
//! ```
//!
//! Every exchange is a 4-byte big-endian length followed by a JSON object.
//! File bytes follow their control frame as an 8-byte big-endian length and
//! the raw payload.
//!
//! ## Usage
//!
//! ### Start a coordinator
//! ```bash
//! minifs-coord serve --bind 0.0.0.0:9000
//! ```
//!
//! ### Start a storage node
//! ```bash
//! minifs-node --bind 0.0.0.0:10000 \
//!   --coordinator 127.0.0.1:9000 \
//!   --capacity-gb 5
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minifs put ./report.pdf --user alice
//! minifs get <file-id> --output ./report.pdf
//! minifs ls --user alice
//! minifs rm <file-id> --user alice
//! minifs nodes
//! ```

pub mod common;
pub mod coordinator;
pub mod node;
pub mod ops;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use node::StorageNode;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
