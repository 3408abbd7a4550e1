//! Tuning for the can-match phase.
//!
//! Read from the `[can_match]` table of a TOML document. Every key is
//! optional; missing keys take the defaults below.
//!
//! ```toml
//! [can_match]
//! pre_filter_shard_size = 64
//! max_concurrent_tasks = 16
//! max_queued_tasks = 4096
//! always_query_one_shard = true
//! probe_timeout_ms = 5000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sieve_types::SortSpec;

use crate::error::EngineError;

/// Shard count above which the phase runs when the request has no
/// primary field sort and no explicit threshold is configured.
pub const DEFAULT_PRE_FILTER_SHARD_SIZE: usize = 128;

/// Can-match phase configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanMatchConfig {
    /// Run the phase only when the request targets more shards than this.
    ///
    /// When unset, the threshold is 1 for requests sorting on a field (the
    /// shard ordering alone pays for the round trip) and
    /// [`DEFAULT_PRE_FILTER_SHARD_SIZE`] otherwise.
    pub pre_filter_shard_size: Option<usize>,
    /// Dispatch tasks a [`BoundedExecutor`](crate::BoundedExecutor) runs at once.
    pub max_concurrent_tasks: usize,
    /// Dispatch tasks a [`BoundedExecutor`](crate::BoundedExecutor) lets wait
    /// before rejecting new ones.
    pub max_queued_tasks: usize,
    /// Keep the first shard when every shard could be skipped, so the next
    /// phase still has one shard to build an empty response from.
    pub always_query_one_shard: bool,
    /// Per-probe timeout applied by the transport adapter.
    pub probe_timeout_ms: Option<u64>,
}

impl Default for CanMatchConfig {
    fn default() -> Self {
        Self {
            pre_filter_shard_size: None,
            max_concurrent_tasks: 32,
            max_queued_tasks: 10_000,
            always_query_one_shard: true,
            probe_timeout_ms: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    can_match: CanMatchConfig,
}

impl CanMatchConfig {
    /// Parse the `[can_match]` table of a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let file: ConfigFile = toml::from_str(text)?;
        file.can_match.validate()?;
        Ok(file.can_match)
    }

    /// Reject values no executor can work with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrent_tasks == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.max_queued_tasks == 0 {
            return Err(EngineError::InvalidConfig(
                "max_queued_tasks must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout_ms == Some(0) {
            return Err(EngineError::InvalidConfig(
                "probe_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Shard count the request has to exceed for the phase to run.
    pub fn pre_filter_threshold(&self, sort: Option<&SortSpec>) -> usize {
        match (self.pre_filter_shard_size, sort) {
            (Some(size), _) => size,
            (None, Some(_)) => 1,
            (None, None) => DEFAULT_PRE_FILTER_SHARD_SIZE,
        }
    }

    /// Whether a request over `shard_count` shards is worth pre-filtering.
    pub fn should_pre_filter(&self, shard_count: usize, sort: Option<&SortSpec>) -> bool {
        shard_count > self.pre_filter_threshold(sort)
    }

    /// Per-probe timeout, if configured.
    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_ms.map(Duration::from_millis)
    }
}
