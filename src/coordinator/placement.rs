//! Placement of new uploads
//!
//! Every file lives on exactly one node. The node is picked among online
//! nodes that can hold the whole file, preferring the one with the most free
//! space so load spreads toward the least-utilized nodes.

use crate::common::{format_bytes, Error, NodeRecord, Result};

/// Select the node that should receive `file_size` bytes.
///
/// Ties on free space go to the first candidate seen.
pub fn select_node<'a, I>(nodes: I, file_size: u64) -> Result<&'a NodeRecord>
where
    I: IntoIterator<Item = &'a NodeRecord>,
{
    let mut best: Option<&NodeRecord> = None;
    let mut online = 0usize;

    for node in nodes.into_iter().filter(|n| n.status.is_online()) {
        online += 1;
        if node.free_bytes() < file_size {
            continue;
        }
        match best {
            Some(current) if current.free_bytes() >= node.free_bytes() => {}
            _ => best = Some(node),
        }
    }

    best.ok_or_else(|| {
        Error::Capacity(format!(
            "no available storage node has {} free ({} online)",
            format_bytes(file_size),
            online
        ))
    })
}
