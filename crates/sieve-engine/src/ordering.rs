//! Skip flags and shard ordering.
//!
//! Once every probe of a phase has an outcome, [`ShardOrderingPolicy`]
//! turns the outcomes into the list the next phase walks: each shard once,
//! flagged to skip or not, and ordered by sort bound when the request sorts
//! on a field.

use std::cmp::Ordering;

use sieve_types::{
    Bound, BoundKind, OrderedShardResult, ProbeOutcome, RoutedShard, ShardTarget, SortOrder,
    SortSpec,
};
use tracing::debug;

use crate::config::CanMatchConfig;

/// Computes skip flags and the delivery order of a phase.
///
/// The result is a pure function of the outcomes and their routing order;
/// the order in which probes completed plays no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardOrderingPolicy {
    always_query_one_shard: bool,
}

impl Default for ShardOrderingPolicy {
    fn default() -> Self {
        Self {
            always_query_one_shard: true,
        }
    }
}

impl ShardOrderingPolicy {
    /// Create a policy. With `always_query_one_shard`, a phase where every
    /// shard could be skipped still keeps the first one.
    pub fn new(always_query_one_shard: bool) -> Self {
        Self {
            always_query_one_shard,
        }
    }

    /// Create a policy from the phase configuration.
    pub fn from_config(config: &CanMatchConfig) -> Self {
        Self::new(config.always_query_one_shard)
    }

    /// Whether the keep-one rule is active.
    pub fn always_query_one_shard(&self) -> bool {
        self.always_query_one_shard
    }

    /// Order `outcomes`, given in routing order, into the phase result.
    pub fn order(
        &self,
        outcomes: Vec<(ShardTarget, ProbeOutcome)>,
        sort: Option<&SortSpec>,
    ) -> OrderedShardResult {
        let mut skip: Vec<bool> = outcomes.iter().map(|(_, o)| !o.matched).collect();
        if self.always_query_one_shard && !skip.is_empty() && skip.iter().all(|s| *s) {
            debug!(shards = skip.len(), "no shard can match, keeping the first one");
            skip[0] = false;
        }
        let failed = outcomes.iter().filter(|(_, o)| o.failed).count();

        let positions = match sort {
            Some(sort) if sortable_kind(&outcomes).is_some() => {
                Some(sort_positions(&outcomes, sort.order))
            }
            _ => None,
        };
        let sorted = positions.is_some();

        let mut slots: Vec<Option<RoutedShard>> = outcomes
            .into_iter()
            .zip(skip)
            .map(|((target, _), skip)| Some(RoutedShard { target, skip }))
            .collect();
        let shards = match positions {
            Some(positions) => positions
                .into_iter()
                .filter_map(|position| slots[position].take())
                .collect(),
            None => slots.into_iter().flatten().collect(),
        };

        OrderedShardResult::new(shards, failed, sorted)
    }
}

/// The kind shared by every reported bound, or `None` when the shards
/// cannot be ordered: no bound was reported, or the kinds differ.
fn sortable_kind(outcomes: &[(ShardTarget, ProbeOutcome)]) -> Option<BoundKind> {
    let mut kinds = outcomes
        .iter()
        .filter_map(|(_, o)| o.bound.as_ref().map(Bound::kind));
    let first = kinds.next()?;
    if let Some(other) = kinds.find(|kind| *kind != first) {
        debug!(
            ?first,
            ?other,
            "sort bounds of different kinds, keeping routing order"
        );
        return None;
    }
    Some(first)
}

/// Routing positions sorted by bound, then shard identity, then position.
fn sort_positions(outcomes: &[(ShardTarget, ProbeOutcome)], order: SortOrder) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..outcomes.len()).collect();
    positions.sort_by(|&a, &b| {
        let (target_a, outcome_a) = &outcomes[a];
        let (target_b, outcome_b) = &outcomes[b];
        compare_bounds(outcome_a.bound.as_ref(), outcome_b.bound.as_ref(), order)
            .then_with(|| target_a.identity_cmp(target_b))
            .then_with(|| a.cmp(&b))
    });
    positions
}

/// Missing bounds sort after present ones, whatever the direction.
fn compare_bounds(a: Option<&Bound>, b: Option<&Bound>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(b, order).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
