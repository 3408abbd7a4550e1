//! Connection lookup.
//!
//! The coordinator never owns connections. It asks a [`ConnectionResolver`]
//! for one per probe attempt and hands it to the transport.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sieve_types::NodeId;

use crate::error::NetError;

/// A reusable channel to one node.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Node at the other end.
    fn node_id(&self) -> &NodeId;

    /// Remote cluster the node belongs to, `None` for the local cluster.
    fn cluster_alias(&self) -> Option<&str>;
}

/// A plain connection handle: just the node identity.
///
/// Enough for transports that route by node id themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConnection {
    node_id: NodeId,
    cluster_alias: Option<String>,
}

impl NodeConnection {
    /// Handle to a node of the local cluster.
    pub fn local(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            cluster_alias: None,
        }
    }

    /// Handle to a node of a remote cluster.
    pub fn remote(cluster_alias: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            cluster_alias: Some(cluster_alias.into()),
        }
    }
}

impl Connection for NodeConnection {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn cluster_alias(&self) -> Option<&str> {
        self.cluster_alias.as_deref()
    }
}

/// Resolves `(cluster alias, node)` to a connection.
///
/// From the coordinator's point of view this is a pure function of its
/// inputs; caching and connection lifecycle are the resolver's business.
pub trait ConnectionResolver: Send + Sync {
    /// Look up the connection for `node_id` on `cluster_alias`.
    fn resolve(
        &self,
        cluster_alias: Option<&str>,
        node_id: &NodeId,
    ) -> Result<Arc<dyn Connection>, NetError>;
}

impl<F> ConnectionResolver for F
where
    F: Fn(Option<&str>, &NodeId) -> Result<Arc<dyn Connection>, NetError> + Send + Sync,
{
    fn resolve(
        &self,
        cluster_alias: Option<&str>,
        node_id: &NodeId,
    ) -> Result<Arc<dyn Connection>, NetError> {
        self(cluster_alias, node_id)
    }
}

/// Resolver backed by a fixed map, built once before the phase starts.
#[derive(Debug, Default)]
pub struct StaticResolver {
    connections: HashMap<(Option<String>, NodeId), Arc<dyn Connection>>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`NodeConnection`] for a local node.
    pub fn with_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.insert(Arc::new(NodeConnection::local(node_id)));
        self
    }

    /// Register a [`NodeConnection`] for a node of a remote cluster.
    pub fn with_remote_node(
        mut self,
        cluster_alias: impl Into<String>,
        node_id: impl Into<NodeId>,
    ) -> Self {
        self.insert(Arc::new(NodeConnection::remote(cluster_alias, node_id)));
        self
    }

    /// Register any connection, keyed by its own node id and cluster alias.
    pub fn insert(&mut self, connection: Arc<dyn Connection>) {
        let key = (
            connection.cluster_alias().map(str::to_string),
            connection.node_id().clone(),
        );
        self.connections.insert(key, connection);
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl ConnectionResolver for StaticResolver {
    fn resolve(
        &self,
        cluster_alias: Option<&str>,
        node_id: &NodeId,
    ) -> Result<Arc<dyn Connection>, NetError> {
        let key = (cluster_alias.map(str::to_string), node_id.clone());
        self.connections
            .get(&key)
            .cloned()
            .ok_or_else(|| NetError::NodeNotConnected {
                node_id: node_id.clone(),
                cluster_alias: key.0,
            })
    }
}
