//! Probe messages and their wire framing.
//!
//! Messages are postcard-encoded and sent as a 4-byte big-endian length
//! prefix followed by the payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sieve_types::{AliasFilter, Bound, NodeId, ShardId, SortSpec};

use crate::error::NetError;

/// Maximum probe frame payload: 1 MB. Probes carry a query source and an
/// alias filter, never document data.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A can-match probe for one shard copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Shard being probed.
    pub shard_id: ShardId,
    /// Node holding the copy being probed.
    pub node_id: NodeId,
    /// Remote cluster alias, `None` for the local cluster.
    pub cluster_alias: Option<String>,
    /// Alias filter to apply on the shard.
    pub alias_filter: AliasFilter,
    /// Serialized query source of the search request.
    pub source: Option<Bytes>,
    /// Primary sort of the request, if any. Shards report bounds for it.
    pub sort: Option<SortSpec>,
    /// Number of shards taking part in the request.
    pub shard_count: usize,
}

/// Answer of a shard to a can-match probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// Whether the shard may hold matching documents.
    pub can_match: bool,
    /// Min/max of the requested sort field on the shard.
    pub bound: Option<Bound>,
}

impl ProbeResponse {
    /// Create a response.
    pub fn new(can_match: bool, bound: Option<Bound>) -> Self {
        Self { can_match, bound }
    }

    /// The shard may match; no bound reported.
    pub fn matched() -> Self {
        Self::new(true, None)
    }

    /// The shard cannot match.
    pub fn no_match() -> Self {
        Self::new(false, None)
    }
}

/// Envelope exchanged between the coordinator and data nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeMessage {
    /// Probe a shard copy.
    CanMatchRequest(ProbeRequest),
    /// Successful answer to a [`ProbeMessage::CanMatchRequest`].
    CanMatchResponse(ProbeResponse),
    /// The shard failed to evaluate the probe.
    CanMatchFailure {
        /// Error text from the data node.
        message: String,
    },
}

impl ProbeMessage {
    /// Encode as a length-prefixed postcard frame.
    pub fn encode_frame(&self) -> Result<Vec<u8>, NetError> {
        let payload =
            postcard::to_allocvec(self).map_err(|e| NetError::Serialization(e.to_string()))?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(NetError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode one length-prefixed frame. Trailing bytes are rejected.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, NetError> {
        let Some((prefix, payload)) = frame.split_first_chunk::<4>() else {
            return Err(NetError::Truncated {
                expected: 4,
                actual: frame.len(),
            });
        };

        let len = u32::from_be_bytes(*prefix) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(NetError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if payload.len() < len {
            return Err(NetError::Truncated {
                expected: len,
                actual: payload.len(),
            });
        }
        if payload.len() > len {
            return Err(NetError::Serialization(format!(
                "{} trailing bytes after frame",
                payload.len() - len
            )));
        }

        postcard::from_bytes(payload).map_err(|e| NetError::Serialization(e.to_string()))
    }

    /// Interpret this message as the answer to a probe sent to `node_id`.
    pub fn into_response(self, node_id: &NodeId) -> Result<ProbeResponse, NetError> {
        match self {
            ProbeMessage::CanMatchResponse(response) => Ok(response),
            ProbeMessage::CanMatchFailure { message } => Err(NetError::Remote {
                node_id: node_id.clone(),
                message,
            }),
            ProbeMessage::CanMatchRequest(request) => Err(NetError::UnexpectedMessage(format!(
                "probe request for {} where a response was expected",
                request.shard_id
            ))),
        }
    }
}
