//! Integration test: probe fan-out over a healthy cluster.
//!
//! Three indices of time-partitioned shards on a 4-node cluster. Range
//! queries should leave only the overlapping shards in the search.

use sieve_engine::CanMatchConfig;
use sieve_integration_tests::{RangeQuery, ShardData, SimCluster, init_tracing, queried_ordinals};

/// Shard `i` holds `[i * 100, i * 100 + 99]`.
fn daily(ordinal: u32) -> ShardData {
    let min = i64::from(ordinal) * 100;
    ShardData::Range { min, max: min + 99 }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_range_query_skips_disjoint_shards() {
    init_tracing();
    let mut c = SimCluster::new(4);
    c.add_index("events", 20, 1, daily);
    let coordinator = c.coordinator(&CanMatchConfig::default());

    let result = SimCluster::run_phase(
        &coordinator,
        c.targets("events"),
        RangeQuery::new(450, 720),
        None,
    )
    .await;

    assert_eq!(result.len(), 20);
    assert_eq!(queried_ordinals(&result), vec![4, 5, 6, 7]);
    assert_eq!(result.summary().skipped, 16);
    assert_eq!(result.summary().failed, 0);
    assert_eq!(c.probes_served(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_match_all_keeps_every_shard() {
    init_tracing();
    let mut c = SimCluster::new(3);
    c.add_index("events", 12, 0, daily);
    let coordinator = c.coordinator(&CanMatchConfig::default());

    let result =
        SimCluster::run_phase(&coordinator, c.targets("events"), RangeQuery::all(), None).await;

    assert_eq!(queried_ordinals(&result), (0..12).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_match_keeps_first_shard() {
    init_tracing();
    let mut c = SimCluster::new(3);
    c.add_index("events", 8, 1, daily);
    let coordinator = c.coordinator(&CanMatchConfig::default());

    let result = SimCluster::run_phase(
        &coordinator,
        c.targets("events"),
        RangeQuery::new(10_000, 20_000),
        None,
    )
    .await;

    assert_eq!(queried_ordinals(&result), vec![0]);
    assert_eq!(result.summary().skipped, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_match_without_keep_one() {
    init_tracing();
    let mut c = SimCluster::new(3);
    c.add_index("events", 8, 1, daily);
    let config = CanMatchConfig::from_toml_str("[can_match]\nalways_query_one_shard = false\n")
        .unwrap();
    let coordinator = c.coordinator(&config);

    let result = SimCluster::run_phase(
        &coordinator,
        c.targets("events"),
        RangeQuery::new(10_000, 20_000),
        None,
    )
    .await;

    assert!(queried_ordinals(&result).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_shards_are_skipped_across_indices() {
    init_tracing();
    let mut c = SimCluster::new(4);
    c.add_index("hot", 4, 1, daily);
    c.add_index("cold", 4, 1, |_| ShardData::Empty);
    let coordinator = c.coordinator(&CanMatchConfig::default());

    let result =
        SimCluster::run_phase(&coordinator, c.all_targets(), RangeQuery::all(), None).await;

    assert_eq!(result.len(), 8);
    for routed in &result {
        let cold = routed.target.shard_id().index.as_str() == "cold";
        assert_eq!(routed.skip, cold, "{}", routed.target);
    }
}

#[test]
fn test_pre_filter_threshold() {
    let config = CanMatchConfig::default();
    let sort = sieve_types::SortSpec::desc("ts");
    assert!(!config.should_pre_filter(20, None));
    assert!(config.should_pre_filter(20, Some(&sort)));
    assert!(config.should_pre_filter(4096, None));
}
