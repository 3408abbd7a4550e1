//! Single-resolution callback for one probe.

use std::fmt;

use tracing::trace;

use crate::error::NetError;
use crate::message::ProbeResponse;

type Callback = Box<dyn FnOnce(Result<ProbeResponse, NetError>) + Send + 'static>;

/// Receives the result of one probe.
///
/// Resolving consumes the listener, so a success and a failure can never
/// both be delivered. A listener dropped without being resolved delivers
/// [`NetError::ListenerDropped`] from its destructor.
pub struct ProbeListener {
    callback: Option<Callback>,
}

impl ProbeListener {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<ProbeResponse, NetError>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Deliver a successful response.
    pub fn on_response(self, response: ProbeResponse) {
        self.resolve(Ok(response));
    }

    /// Deliver a failure.
    pub fn on_failure(self, error: NetError) {
        self.resolve(Err(error));
    }

    /// Deliver either outcome.
    pub fn resolve(mut self, result: Result<ProbeResponse, NetError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for ProbeListener {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            trace!("probe listener dropped unresolved");
            callback(Err(NetError::ListenerDropped));
        }
    }
}

impl fmt::Debug for ProbeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeListener")
            .field("resolved", &self.callback.is_none())
            .finish()
    }
}
