//! Shared types and identifiers for Sieve.
//!
//! This crate defines the data model used across the Sieve workspace:
//! identifiers ([`NodeId`], [`IndexName`], [`ShardId`]), probe targets
//! ([`ShardTarget`], [`AliasFilter`]), per-shard probe results
//! ([`ProbeOutcome`]) and the phase output ([`OrderedShardResult`]).
//! Sort bounds and their comparison rules live in [`bound`].

pub mod bound;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use bound::{Bound, BoundKind, SortOrder, SortSpec};

// ---------------------------------------------------------------------------
// Name types
// ---------------------------------------------------------------------------

macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create a name from anything string-like.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Return the name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_name!(
    /// Identifier of a cluster node, as handed out by cluster membership.
    NodeId
);

define_name!(
    /// Name of an index.
    IndexName
);

// ---------------------------------------------------------------------------
// Shard identity
// ---------------------------------------------------------------------------

/// Identity of one shard: the index it belongs to and its ordinal.
///
/// Ordered by ordinal first, then by index name. This is the tie-breaker
/// used when two shards report equal sort bounds.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardId {
    /// Index the shard belongs to.
    pub index: IndexName,
    /// Shard number within the index.
    pub ordinal: u32,
}

impl ShardId {
    /// Create a shard id.
    pub fn new(index: impl Into<IndexName>, ordinal: u32) -> Self {
        Self {
            index: index.into(),
            ordinal,
        }
    }
}

impl Ord for ShardId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for ShardId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.ordinal)
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({self})")
    }
}

/// Alias context forwarded with every probe of a shard.
///
/// `filter` is an opaque, already-serialized filter the shard applies on
/// top of the request query when the index was addressed through an alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasFilter {
    /// Alias names that resolved to this shard's index.
    pub aliases: Vec<String>,
    /// Serialized filter combined from the aliases, if any.
    pub filter: Option<Vec<u8>>,
}

impl AliasFilter {
    /// An alias filter that restricts nothing.
    pub fn none() -> Self {
        Self::default()
    }
}

/// One shard to probe during a can-match phase.
///
/// A target lists every allocated copy of the shard, primary first. The
/// first copy is the node the probe goes to; later copies are only tried
/// when earlier ones fail. A target with no copies is unassigned and is
/// never probed.
///
/// Targets are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTarget {
    shard_id: ShardId,
    cluster_alias: Option<String>,
    alias_filter: AliasFilter,
    copies: Vec<NodeId>,
}

impl ShardTarget {
    /// Create a target for a shard held by `node` on the local cluster.
    pub fn new(shard_id: ShardId, node: impl Into<NodeId>) -> Self {
        Self {
            shard_id,
            cluster_alias: None,
            alias_filter: AliasFilter::none(),
            copies: vec![node.into()],
        }
    }

    /// Create a target for a shard that currently has no allocated copy.
    pub fn unassigned(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            cluster_alias: None,
            alias_filter: AliasFilter::none(),
            copies: Vec::new(),
        }
    }

    /// Append replica copies, tried in order after the primary fails.
    pub fn with_replicas<I, N>(mut self, replicas: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        self.copies.extend(replicas.into_iter().map(Into::into));
        self
    }

    /// Mark the target as living on a remote cluster.
    pub fn with_cluster_alias(mut self, alias: impl Into<String>) -> Self {
        self.cluster_alias = Some(alias.into());
        self
    }

    /// Attach the alias filter resolved for this shard's index.
    pub fn with_alias_filter(mut self, alias_filter: AliasFilter) -> Self {
        self.alias_filter = alias_filter;
        self
    }

    /// Shard identity.
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Node the probe is sent to first, or `None` when unassigned.
    pub fn node(&self) -> Option<&NodeId> {
        self.copies.first()
    }

    /// Every copy of the shard, in the order they are tried.
    pub fn copies(&self) -> &[NodeId] {
        &self.copies
    }

    /// Remote cluster alias, `None` for the local cluster.
    pub fn cluster_alias(&self) -> Option<&str> {
        self.cluster_alias.as_deref()
    }

    /// Alias filter forwarded with each probe.
    pub fn alias_filter(&self) -> &AliasFilter {
        &self.alias_filter
    }

    /// Total order over target identity: shard id, then cluster alias
    /// (local cluster first).
    pub fn identity_cmp(&self, other: &Self) -> Ordering {
        self.shard_id
            .cmp(&other.shard_id)
            .then_with(|| self.cluster_alias.cmp(&other.cluster_alias))
    }
}

impl fmt::Display for ShardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cluster_alias {
            Some(alias) => write!(f, "{alias}:{}", self.shard_id),
            None => write!(f, "{}", self.shard_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Probe outcomes
// ---------------------------------------------------------------------------

/// Result of probing one shard.
///
/// A failed probe is recorded as `matched = true` with no bound: a shard
/// that could not be checked is never skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the shard may hold matching documents.
    pub matched: bool,
    /// Min/max of the primary sort field on the shard, when reported.
    pub bound: Option<Bound>,
    /// Whether every attempt to probe the shard failed.
    pub failed: bool,
}

impl ProbeOutcome {
    /// Outcome of a probe that completed.
    pub fn success(matched: bool, bound: Option<Bound>) -> Self {
        Self {
            matched,
            bound,
            failed: false,
        }
    }

    /// Outcome of a shard that could not be probed.
    pub fn failure() -> Self {
        Self {
            matched: true,
            bound: None,
            failed: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase output
// ---------------------------------------------------------------------------

/// A shard target annotated with its skip decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedShard {
    /// The shard.
    pub target: ShardTarget,
    /// Whether the next phase should leave this shard out.
    pub skip: bool,
}

/// Counters describing how a can-match phase went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseSummary {
    /// Number of shard targets that entered the phase.
    pub total: usize,
    /// Number of shards flagged to skip.
    pub skipped: usize,
    /// Number of shards whose probe failed on every copy.
    pub failed: usize,
    /// Whether the shards were reordered by sort bounds.
    pub sorted: bool,
}

/// The output of a can-match phase: every input shard exactly once, in
/// the order the next phase should visit them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedShardResult {
    shards: Vec<RoutedShard>,
    summary: PhaseSummary,
}

impl OrderedShardResult {
    /// Build a result from already-ordered shards.
    pub fn new(shards: Vec<RoutedShard>, failed: usize, sorted: bool) -> Self {
        let skipped = shards.iter().filter(|s| s.skip).count();
        let summary = PhaseSummary {
            total: shards.len(),
            skipped,
            failed,
            sorted,
        };
        Self { shards, summary }
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Whether the phase had no shards at all.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shards in delivery order.
    pub fn shards(&self) -> &[RoutedShard] {
        &self.shards
    }

    /// Iterate shards in delivery order.
    pub fn iter(&self) -> std::slice::Iter<'_, RoutedShard> {
        self.shards.iter()
    }

    /// Shard at `position` in delivery order.
    pub fn get(&self, position: usize) -> Option<&RoutedShard> {
        self.shards.get(position)
    }

    /// Shard ids in delivery order.
    pub fn shard_ids(&self) -> Vec<&ShardId> {
        self.shards.iter().map(|s| s.target.shard_id()).collect()
    }

    /// Shards the next phase has to query.
    pub fn to_query(&self) -> impl Iterator<Item = &RoutedShard> {
        self.shards.iter().filter(|s| !s.skip)
    }

    /// Phase counters.
    pub fn summary(&self) -> PhaseSummary {
        self.summary
    }

    /// Take ownership of the shard list.
    pub fn into_shards(self) -> Vec<RoutedShard> {
        self.shards
    }
}

impl IntoIterator for OrderedShardResult {
    type Item = RoutedShard;
    type IntoIter = std::vec::IntoIter<RoutedShard>;

    fn into_iter(self) -> Self::IntoIter {
        self.shards.into_iter()
    }
}

impl<'a> IntoIterator for &'a OrderedShardResult {
    type Item = &'a RoutedShard;
    type IntoIter = std::slice::Iter<'a, RoutedShard>;

    fn into_iter(self) -> Self::IntoIter {
        self.shards.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
