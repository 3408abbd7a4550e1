//! The can-match pre-filter phase.
//!
//! Before a search runs its query on every shard, the [`ProbeCoordinator`]
//! asks each shard a cheap question: could you hold a match, and what is
//! the range of the sort field on you? Shards that cannot match are flagged
//! to skip; when the request sorts on a field, the [`ShardOrderingPolicy`]
//! also orders the shards so the most promising ones are visited first.
//!
//! Probes that fail are never skipped (fail-open). Dispatch runs on an
//! injected [`Executor`]; the result is handed to a [`NextPhase`] exactly
//! once.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod ordering;

pub use config::CanMatchConfig;
pub use coordinator::{NextPhase, PhaseHandle, PhaseRequest, ProbeCoordinator};
pub use error::EngineError;
pub use executor::{BoundedExecutor, DirectExecutor, Executor, Task};
pub use ordering::ShardOrderingPolicy;
