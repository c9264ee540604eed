//! Performance baseline measurements for the Group Object Table Manager
//!
//! Establishes latency targets for table churn and regression testing

use knx_cfgmgr_test::{fixtures::got_fixtures, GotTestEnv};
use knx_gotd::GOT_MAX_ENTRIES;
use std::time::Instant;

/// Baseline: add/remove latency on a volatile store
///
/// Target: <1ms per operation
#[tokio::test]
async fn benchmark_table_churn_latency() {
    let env = GotTestEnv::memory(GOT_MAX_ENTRIES);

    let rounds = 50;
    let start = Instant::now();

    for _ in 0..rounds {
        for change in got_fixtures::numbered(GOT_MAX_ENTRIES) {
            change.apply(&env.mgr).await.expect("Failed to add");
        }
        for id in 1..=GOT_MAX_ENTRIES as i32 {
            env.mgr.remove_entry(id).await.expect("Failed to remove");
        }
    }

    let operations = (rounds * GOT_MAX_ENTRIES * 2) as u32;
    let elapsed = start.elapsed();
    let avg_latency = elapsed / operations;

    println!(
        "Table churn latency: {:?} (avg over {} operations)",
        avg_latency, operations
    );
    println!("Total time: {:?}", elapsed);

    assert!(env.mgr.is_empty().await);
    assert!(env.registrar.joined().is_empty());
    assert!(
        avg_latency.as_micros() < 1000,
        "Table churn latency too high: {:?}",
        avg_latency
    );
}

/// Baseline: full-table restore from a file store
///
/// Target: <50ms per restore
#[tokio::test]
async fn benchmark_file_restore_latency() {
    let mut env = GotTestEnv::file(GOT_MAX_ENTRIES).expect("Failed to create store");
    for change in got_fixtures::numbered(GOT_MAX_ENTRIES) {
        change.apply(&env.mgr).await.expect("Failed to add");
    }

    let iterations = 20;
    let start = Instant::now();

    for _ in 0..iterations {
        let report = env.restart().await.expect("Failed to restore");
        assert_eq!(report.entries, GOT_MAX_ENTRIES);
    }

    let elapsed = start.elapsed();
    let avg_latency = elapsed / iterations;

    println!(
        "File restore latency: {:?} (avg over {} iterations)",
        avg_latency, iterations
    );

    assert!(
        avg_latency.as_millis() < 50,
        "File restore latency too high: {:?}",
        avg_latency
    );
}

/// Baseline: lookup latency on a full table
///
/// Target: <100us per lookup
#[tokio::test]
async fn benchmark_lookup_latency() {
    let env = GotTestEnv::memory(GOT_MAX_ENTRIES);
    for change in got_fixtures::numbered(GOT_MAX_ENTRIES) {
        change.apply(&env.mgr).await.expect("Failed to add");
    }

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let id = (i % GOT_MAX_ENTRIES) as i32 + 1;
        let index = env.mgr.find_index_by_id(id).await;
        assert_eq!(index, Some(id as usize - 1));
    }

    let elapsed = start.elapsed();
    let avg_latency = elapsed / iterations as u32;

    println!(
        "Lookup latency: {:?} (avg over {} iterations)",
        avg_latency, iterations
    );

    assert!(
        avg_latency.as_micros() < 100,
        "Lookup latency too high: {:?}",
        avg_latency
    );
}
