//! Error types for the engine.

/// Errors that can occur while configuring the engine or dispatching work.
///
/// Per-shard probe failures never show up here: they are recorded as
/// fail-open outcomes inside the phase.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration file is not valid TOML for [`CanMatchConfig`](crate::CanMatchConfig).
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The executor queue is full.
    #[error("dispatch rejected: {queued} tasks queued (limit {limit})")]
    Rejected {
        /// Tasks waiting when the new one arrived.
        queued: usize,
        /// Configured queue limit.
        limit: usize,
    },

    /// The executor no longer accepts work.
    #[error("executor is shut down")]
    ExecutorShutdown,

    /// No tokio runtime is available to run tasks on.
    #[error("no runtime: {0}")]
    NoRuntime(String),
}
