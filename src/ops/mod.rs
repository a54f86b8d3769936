//! Gateway and operator commands built on the coordinator and node clients

pub mod status;
pub mod transfer;

pub use status::{cluster_status, ClusterReport};
pub use transfer::{get_file, put_file, remove_file, PutReport, RemoveReport};
