//! Adapter from async probe transports to the listener-based
//! [`ProbeTransport`](crate::ProbeTransport) seam.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::ProbeTransport;
use crate::error::NetError;
use crate::listener::ProbeListener;
use crate::message::{ProbeRequest, ProbeResponse};
use crate::resolver::Connection;

/// A transport whose probes are futures.
///
/// This is the shape real network clients have. Wrap one in a
/// [`SpawnedTransport`] to hand it to the coordinator.
#[async_trait::async_trait]
pub trait AsyncProbeTransport: Send + Sync + 'static {
    /// Probe one shard copy and wait for its answer.
    async fn can_match(
        &self,
        connection: Arc<dyn Connection>,
        request: ProbeRequest,
    ) -> Result<ProbeResponse, NetError>;
}

/// Runs each probe of an [`AsyncProbeTransport`] as a task on a tokio
/// runtime and resolves the listener with its result.
///
/// An optional per-probe timeout turns slow probes into
/// [`NetError::Timeout`] failures. If the runtime shuts down before a task
/// runs, the task is dropped along with its listener, which resolves as a
/// failure.
pub struct SpawnedTransport<T> {
    inner: Arc<T>,
    handle: Handle,
    timeout: Option<Duration>,
}

impl<T: AsyncProbeTransport> SpawnedTransport<T> {
    /// Spawn probes of `inner` on `handle`.
    pub fn new(inner: Arc<T>, handle: Handle) -> Self {
        Self {
            inner,
            handle,
            timeout: None,
        }
    }

    /// Spawn probes on the runtime the caller is running in.
    pub fn current(inner: Arc<T>) -> Result<Self, NetError> {
        let handle = Handle::try_current().map_err(|e| NetError::Dispatch(e.to_string()))?;
        Ok(Self::new(inner, handle))
    }

    /// Fail probes that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

impl<T: AsyncProbeTransport> ProbeTransport for SpawnedTransport<T> {
    fn send_probe(
        &self,
        connection: Arc<dyn Connection>,
        request: ProbeRequest,
        listener: ProbeListener,
    ) -> Result<(), NetError> {
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        trace!(shard = %request.shard_id, node = %request.node_id, "spawning probe");

        self.handle.spawn(async move {
            let shard_id = request.shard_id.clone();
            let result = match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, inner.can_match(connection, request)).await {
                        Ok(result) => result,
                        Err(_) => {
                            debug!(shard = %shard_id, ?limit, "probe timed out");
                            Err(NetError::Timeout(limit))
                        }
                    }
                }
                None => inner.can_match(connection, request).await,
            };
            listener.resolve(result);
        });

        Ok(())
    }
}
