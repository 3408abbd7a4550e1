//! Probe transport seams for Sieve.
//!
//! This crate defines everything the can-match coordinator needs from the
//! network without owning the network itself:
//!
//! - [`ProbeRequest`] / [`ProbeResponse`]: what a probe carries, plus the
//!   postcard-encoded [`ProbeMessage`] frame used on the wire.
//! - [`ProbeTransport`]: sends one probe and resolves a [`ProbeListener`]
//!   exactly once.
//! - [`AsyncProbeTransport`] + [`SpawnedTransport`]: adapter that runs an
//!   async transport on a tokio runtime and resolves the listener for it.
//! - [`ConnectionResolver`]: pure `(cluster alias, node) -> connection`
//!   lookup, with a closure impl and the map-backed [`StaticResolver`].

mod error;
mod listener;
mod message;
mod resolver;
mod transport;

use std::sync::Arc;

pub use error::NetError;
pub use listener::ProbeListener;
pub use message::{MAX_FRAME_SIZE, ProbeMessage, ProbeRequest, ProbeResponse};
pub use resolver::{Connection, ConnectionResolver, NodeConnection, StaticResolver};
pub use transport::{AsyncProbeTransport, SpawnedTransport};

/// Sends can-match probes to shard copies.
///
/// Implementations must resolve `listener` exactly once when they return
/// `Ok(())`, from any thread and at any later time. Dropping the listener
/// instead counts as a failure. Returning `Err` means the probe was never
/// sent; the caller treats it as a failed attempt on that copy.
///
/// A transport may answer inline, before `send_probe` returns.
pub trait ProbeTransport: Send + Sync {
    /// Send one probe over `connection`.
    fn send_probe(
        &self,
        connection: Arc<dyn Connection>,
        request: ProbeRequest,
        listener: ProbeListener,
    ) -> Result<(), NetError>;
}
