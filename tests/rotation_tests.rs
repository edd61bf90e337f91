use std::sync::Arc;
use std::time::Duration;

use common::testing::{TestConfigBuilder, TestTableBuilder};
use rotator::{
    InMemoryPartitionStore, PartitionSpec, PlanExecutor, RotationMetrics, SequenceNumber,
    TableRef, TableRotator, TickOutcome, rotators_from_config, run_once,
};

const DAY: i64 = 86400;
/// Midnight UTC, start of bucket 19676
const START: i64 = 19676 * DAY;
const FIRST_BUCKET: SequenceNumber = 19676;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn week_retention() -> PartitionSpec {
    PartitionSpec::new(DAY, 7 * DAY, 1, 1, 0).unwrap()
}

async fn setup(dry_run: bool) -> (InMemoryPartitionStore, TableRotator, RotationMetrics) {
    init_logging();

    let store = InMemoryPartitionStore::new();
    let table = TableRef::new("test", "events");
    store.create_table(table.clone()).await;

    let metrics = RotationMetrics::new();
    let shared = Arc::new(store.clone());
    let rotator = TableRotator::new(
        table,
        week_retention(),
        shared.clone(),
        PlanExecutor::new(shared, dry_run),
        metrics.clone(),
    );

    (store, rotator, metrics)
}

fn table() -> TableRef {
    TableRef::new("test", "events")
}

async fn sequences(store: &InMemoryPartitionStore) -> Vec<SequenceNumber> {
    store
        .partitions(&table())
        .await
        .unwrap()
        .into_keys()
        .collect()
}

#[tokio::test]
async fn test_window_rolls_forward_over_a_month() {
    let (store, mut rotator, metrics) = setup(false).await;

    for day in 0..30 {
        let bucket = FIRST_BUCKET + day;

        // Several ticks per day; only the first one after midnight reads
        for hour in [1, 6, 12, 23] {
            let now = START + day * DAY + hour * 3600;
            rotator.tick(now, false).await.unwrap();
        }

        let present = sequences(&store).await;
        let oldest = (FIRST_BUCKET - 1).max(bucket - 8);
        let expected: Vec<_> = (oldest..=bucket + 1).collect();
        assert_eq!(present, expected, "day {day}");
    }

    let summary = metrics.summary();
    assert_eq!(summary.ticks, 120);
    assert_eq!(summary.reconciliations, 30);
    assert_eq!(summary.ticks_skipped, 90);
    // 3 on day one, then one new partition per day
    assert_eq!(summary.partitions_created, 3 + 29);
    assert_eq!(summary.partitions_dropped, 32 - 10);
    assert_eq!(summary.create_failures + summary.drop_failures, 0);
}

#[tokio::test]
async fn test_boundaries_match_bucket_ends() {
    let (store, mut rotator, _) = setup(false).await;

    rotator.tick(START, false).await.unwrap();

    let partitions = store.partitions(&table()).await.unwrap();
    for (sequence, boundary) in partitions {
        assert_eq!(boundary, (sequence + 1) * DAY);
    }
}

#[tokio::test]
async fn test_recovers_from_failures_mid_plan() {
    let (store, mut rotator, metrics) = setup(false).await;
    let table = table();

    // Crash halfway: the middle create fails
    store.reject(&table, FIRST_BUCKET).await;

    let now = START + 3600;
    match rotator.tick(now, false).await.unwrap() {
        TickOutcome::Applied { report, .. } => {
            assert_eq!(report.created, vec![FIRST_BUCKET - 1, FIRST_BUCKET + 1]);
            assert_eq!(report.failures.len(), 1);
        }
        TickOutcome::Skipped => panic!("first tick must reconcile"),
    }
    assert!(rotator.planner().needs_reconciliation(now));

    store.heal().await;

    // Same bucket, but the failure forces another read
    match rotator.tick(now + 60, false).await.unwrap() {
        TickOutcome::Applied { plan, report } => {
            assert_eq!(plan.to_create.len(), 1);
            assert_eq!(plan.to_create[0].sequence, FIRST_BUCKET);
            assert!(report.is_clean());
        }
        TickOutcome::Skipped => panic!("failed tick must be retried"),
    }

    assert_eq!(
        sequences(&store).await,
        vec![FIRST_BUCKET - 1, FIRST_BUCKET, FIRST_BUCKET + 1]
    );
    assert!(!rotator.planner().needs_reconciliation(now + 120));
    assert_eq!(metrics.create_failures(), 1);
}

#[tokio::test]
async fn test_failed_drop_is_retried() {
    let (store, mut rotator, _) = setup(false).await;
    let table = table();

    store.insert(&table, 0, DAY).await;
    store.reject(&table, 0).await;

    let now = START + 3600;
    rotator.tick(now, false).await.unwrap();
    assert!(sequences(&store).await.contains(&0));

    store.heal().await;
    rotator.tick(now + 60, false).await.unwrap();
    assert!(!sequences(&store).await.contains(&0));
}

#[tokio::test]
async fn test_read_failure_then_recovery() {
    let (store, mut rotator, metrics) = setup(false).await;

    store.make_unreadable(&table()).await;
    assert!(rotator.tick(START, false).await.is_err());
    assert!(sequences(&store).await.is_empty());

    store.heal().await;
    rotator.tick(START + 60, false).await.unwrap();

    assert_eq!(sequences(&store).await.len(), 3);
    assert_eq!(metrics.read_failures(), 1);
}

#[tokio::test]
async fn test_restart_after_outage_backfills_gap() {
    let (store, mut rotator, _) = setup(false).await;

    rotator.tick(START, false).await.unwrap();

    // Process was down for five days; a fresh owner comes up with backfill
    let shared = Arc::new(store.clone());
    let mut restarted = TableRotator::new(
        table(),
        week_retention(),
        shared.clone(),
        PlanExecutor::new(shared, false),
        RotationMetrics::new(),
    );

    let now = START + 5 * DAY + 3600;
    restarted.tick(now, true).await.unwrap();

    // Floor is bucket - 8, so backfill starts one above it
    let bucket = FIRST_BUCKET + 5;
    let expected: Vec<_> = (bucket - 7..=bucket + 1).collect();
    assert_eq!(sequences(&store).await, expected);
}

#[tokio::test]
async fn test_dry_run_leaves_table_untouched() {
    let (store, mut rotator, metrics) = setup(true).await;
    store.insert(&table(), 0, DAY).await;

    match rotator.tick(START, false).await.unwrap() {
        TickOutcome::Applied { report, .. } => {
            assert!(report.dry_run);
            assert_eq!(report.created.len(), 3);
            assert_eq!(report.dropped, vec![0]);
        }
        TickOutcome::Skipped => panic!("first tick must reconcile"),
    }

    assert_eq!(sequences(&store).await, vec![0]);
    assert_eq!(metrics.partitions_created(), 0);
    assert_eq!(metrics.partitions_dropped(), 0);
}

#[tokio::test]
async fn test_single_pass_from_configuration() {
    init_logging();

    let config = TestConfigBuilder::new()
        .with_table(
            TestTableBuilder::daily("test", "events")
                .retention(Duration::from_secs(7 * 86400))
                .lookahead(1)
                .timezone_offset_secs(0)
                .build(),
        )
        .with_table(TestTableBuilder::hourly("test", "samples").lookahead(0).build())
        .build();

    let store = InMemoryPartitionStore::new();
    store.create_table(TableRef::new("test", "events")).await;
    store.create_table(TableRef::new("test", "samples")).await;

    let metrics = RotationMetrics::new();
    let mut rotators = rotators_from_config(&config, Arc::new(store.clone()), &metrics).unwrap();
    let results = run_once(&mut rotators, true).await;

    assert!(results.iter().all(|(_, outcome)| outcome.is_ok()));

    // Backfill: everything above the floor through the look-ahead window
    let events = store
        .partitions(&TableRef::new("test", "events"))
        .await
        .unwrap();
    assert_eq!(events.len(), 9);

    // Hourly with one day of retention and no look-ahead
    let samples = store
        .partitions(&TableRef::new("test", "samples"))
        .await
        .unwrap();
    assert_eq!(samples.len(), 25);
}
