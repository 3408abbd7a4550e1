//! Error types for probe transport operations.

use std::time::Duration;

use sieve_types::NodeId;

/// Errors that can occur while resolving a connection or running a probe.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// No connection is known for the node.
    #[error("node {node_id} is not connected{}", cluster_suffix(.cluster_alias))]
    NodeNotConnected {
        /// The node that was looked up.
        node_id: NodeId,
        /// Remote cluster alias, `None` for the local cluster.
        cluster_alias: Option<String>,
    },

    /// The remote shard answered with an error.
    #[error("remote error from {node_id}: {message}")]
    Remote {
        /// Node that reported the error.
        node_id: NodeId,
        /// Error text as reported by the remote side.
        message: String,
    },

    /// The probe did not complete in time.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The transport refused to send the probe.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE).
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared or actual payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// A frame ended before its declared length.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the length prefix promised.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// A message of the wrong kind arrived.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// The listener was dropped without being resolved.
    #[error("probe listener dropped without a response")]
    ListenerDropped,
}

fn cluster_suffix(cluster_alias: &Option<String>) -> String {
    match cluster_alias {
        Some(alias) => format!(" on cluster {alias}"),
        None => String::new(),
    }
}
