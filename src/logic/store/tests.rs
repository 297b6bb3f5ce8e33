use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use super::{Store, StoreError};
use crate::logic::features::MetricSample;

const TABLE: &str = "system_stats";

fn sample_at(secs: i64, cpu: f64) -> MetricSample {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    MetricSample::new(base + Duration::seconds(secs), cpu, 40.0, 60.0)
}

#[test]
fn test_append_query_round_trip() {
    let store = Store::open_in_memory(TABLE).unwrap();
    let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap() + Duration::nanoseconds(123_456_789);
    let sample = MetricSample::new(ts, 12.345678901, 0.0, 100.0);

    store.append(&sample).unwrap();

    let got = store.query(ts, ts).unwrap();
    assert_eq!(got, vec![sample]);
}

#[test]
fn test_query_is_ordered_and_inclusive() {
    let store = Store::open_in_memory(TABLE).unwrap();
    for i in 0..10 {
        store.append(&sample_at(i, i as f64)).unwrap();
    }

    let got = store.query(sample_at(2, 0.0).timestamp, sample_at(5, 0.0).timestamp).unwrap();
    let cpus: Vec<f64> = got.iter().map(|s| s.cpu_percent).collect();
    assert_eq!(cpus, vec![2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn test_empty_range_is_not_an_error() {
    let store = Store::open_in_memory(TABLE).unwrap();
    store.append(&sample_at(0, 1.0)).unwrap();

    let later = sample_at(100, 0.0).timestamp;
    assert!(store.query(later, later + Duration::hours(1)).unwrap().is_empty());

    // Inverted range
    assert!(store.query(later, sample_at(0, 0.0).timestamp).unwrap().is_empty());
}

#[test]
fn test_reject_out_of_range_values() {
    let store = Store::open_in_memory(TABLE).unwrap();

    let mut bad = sample_at(0, 101.0);
    assert!(matches!(store.append(&bad), Err(StoreError::Validation(_))));

    bad.cpu_percent = 10.0;
    bad.disk_percent = -1.0;
    assert!(matches!(store.append(&bad), Err(StoreError::Validation(_))));

    bad.disk_percent = f64::NAN;
    assert!(matches!(store.append(&bad), Err(StoreError::Validation(_))));

    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_reject_older_timestamp() {
    let store = Store::open_in_memory(TABLE).unwrap();
    store.append(&sample_at(10, 1.0)).unwrap();

    let err = store.append(&sample_at(5, 1.0)).unwrap_err();
    assert!(matches!(err, StoreError::Ordering { .. }));
    assert!(err.is_rejection());
    assert!(!err.is_fatal());

    // Equal timestamp is fine
    store.append(&sample_at(10, 2.0)).unwrap();
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn test_recent_and_latest() {
    let store = Store::open_in_memory(TABLE).unwrap();
    assert!(store.latest().unwrap().is_none());

    for i in 0..20 {
        store.append(&sample_at(i, i as f64)).unwrap();
    }

    let recent = store.recent(3).unwrap();
    let cpus: Vec<f64> = recent.iter().map(|s| s.cpu_percent).collect();
    assert_eq!(cpus, vec![17.0, 18.0, 19.0]);

    assert_eq!(store.latest().unwrap().unwrap().cpu_percent, 19.0);
    assert_eq!(store.recent(100).unwrap().len(), 20);
}

#[test]
fn test_reopen_keeps_series_and_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("stats.db");

    {
        let store = Store::open(&path, TABLE).unwrap();
        store.append(&sample_at(0, 5.0)).unwrap();
        store.append(&sample_at(60, 6.0)).unwrap();
    }

    let store = Store::open(&path, TABLE).unwrap();
    assert_eq!(store.count().unwrap(), 2);
    assert_eq!(store.last_timestamp(), Some(sample_at(60, 0.0).timestamp));
    assert!(matches!(
        store.append(&sample_at(30, 1.0)),
        Err(StoreError::Ordering { .. })
    ));
}

#[test]
fn test_reject_invalid_table_name() {
    assert!(matches!(
        Store::open_in_memory("stats; DROP TABLE x"),
        Err(StoreError::Validation(_))
    ));
}

#[test]
fn test_garbage_file_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.db");
    std::fs::write(&path, vec![0xAB; 8192]).unwrap();

    match Store::open(&path, TABLE) {
        Err(e) => assert!(e.is_fatal(), "expected corruption, got {e}"),
        Ok(_) => panic!("garbage file opened as a store"),
    }
}

#[test]
fn test_unreachable_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"file").unwrap();

    match Store::open(&blocker.join("stats.db"), TABLE) {
        Err(e) => {
            assert!(matches!(e, StoreError::Io(_)), "expected io error, got {e}");
            assert!(!e.is_rejection());
            assert!(!e.is_fatal());
        }
        Ok(_) => panic!("store opened under a regular file"),
    }
}

#[test]
fn test_query_after_id_keeps_equal_timestamps() {
    let store = Store::open_in_memory(TABLE).unwrap();
    assert_eq!(store.last_id(), None);

    store.append(&sample_at(0, 1.0)).unwrap();
    store.append(&sample_at(10, 2.0)).unwrap();
    let cursor = store.last_id().unwrap();
    store.append(&sample_at(10, 3.0)).unwrap();
    store.append(&sample_at(20, 4.0)).unwrap();

    let after = store.query_after_id(cursor).unwrap();
    let cpus: Vec<f64> = after.iter().map(|(_, s)| s.cpu_percent).collect();
    assert_eq!(cpus, vec![3.0, 4.0]);
    assert!(after.iter().all(|(id, _)| *id > cursor));
    assert_eq!(after.last().map(|(id, _)| *id), store.last_id());

    assert_eq!(store.query_after_id(0).unwrap().len(), 4);
    assert!(store.query_after_id(cursor + 2).unwrap().is_empty());
}

#[test]
fn test_reopen_restores_last_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.db");

    let before = {
        let store = Store::open(&path, TABLE).unwrap();
        store.append(&sample_at(0, 5.0)).unwrap();
        store.append(&sample_at(0, 6.0)).unwrap();
        store.last_id()
    };

    let store = Store::open(&path, TABLE).unwrap();
    assert!(before.is_some());
    assert_eq!(store.last_id(), before);
}

#[test]
fn test_concurrent_readers_see_whole_rows() {
    let store = Arc::new(Store::open_in_memory(TABLE).unwrap());

    let writer = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            for i in 0..200 {
                store.append(&sample_at(i, (i % 100) as f64)).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let all = store.recent(1000).unwrap();
                    assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
                    assert!(all.iter().all(|s| s.mem_percent == 40.0 && s.disk_percent == 60.0));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(store.count().unwrap(), 200);
}
