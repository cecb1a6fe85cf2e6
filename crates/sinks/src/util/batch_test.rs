//! Batching helper tests

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::timeout;

use super::*;
use crate::test_support::output_runner;

/// What a committer saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Commit(String),
    Rotate,
    Close,
}

#[derive(Clone, Default)]
struct MemoryCommitter {
    events: Arc<Mutex<Vec<Event>>>,
    /// Fail this many commits before succeeding
    failures: Arc<Mutex<usize>>,
}

impl MemoryCommitter {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn committed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Commit(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    fn lines(&self) -> Vec<String> {
        self.committed()
            .iter()
            .flat_map(|data| data.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

impl Committer for MemoryCommitter {
    fn commit(&mut self, batch: &Batch) -> Result<()> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SinkError::Io(std::io::Error::other("disk full")));
            }
        }
        let data = String::from_utf8_lossy(batch.as_bytes()).into_owned();
        self.events.lock().push(Event::Commit(data));
        Ok(())
    }

    fn rotate(&mut self, _at: DateTime<Utc>) -> Result<()> {
        self.events.lock().push(Event::Rotate);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().push(Event::Close);
        Ok(())
    }
}

fn config(flush_interval: Duration, flush_count: usize) -> BatchConfig {
    BatchConfig {
        flush_interval,
        flush_count,
        flush_bytes: 0,
    }
}

// =============================================================================
// Batch
// =============================================================================

#[test]
fn test_batch_appends_delimiter() {
    let mut batch = Batch::with_capacity(16);
    batch.push(b"one");
    batch.push(b"two");

    assert_eq!(batch.as_bytes(), b"one\ntwo\n");
    assert_eq!(batch.records(), 2);
    assert_eq!(batch.len(), 8);

    batch.clear();
    assert!(batch.is_empty());
    assert_eq!(batch.len(), 0);
}

#[test]
fn test_config_defaults_and_thresholds() {
    let config = BatchConfig::default();
    assert_eq!(config.flush_interval, Duration::from_secs(1));

    let mut batch = Batch::default();
    batch.push(b"12345");
    assert!(!config.threshold_reached(&batch));

    let by_count = BatchConfig {
        flush_count: 2,
        ..config
    };
    assert!(!by_count.threshold_reached(&batch));
    batch.push(b"x");
    assert!(by_count.threshold_reached(&batch));

    let by_bytes = BatchConfig {
        flush_bytes: 8,
        ..config
    };
    assert!(by_bytes.threshold_reached(&batch));
}

#[test]
fn test_config_from_toml() {
    let config: BatchConfig =
        toml::from_str("flush_interval = \"250ms\"\nflush_count = 100").unwrap();
    assert_eq!(config.flush_interval, Duration::from_millis(250));
    assert_eq!(config.flush_count, 100);
    assert_eq!(config.flush_bytes, 0);
}

// =============================================================================
// Receiver / Committer
// =============================================================================

#[tokio::test]
async fn test_timer_contract_no_loss_no_duplicates() {
    let committer = MemoryCommitter::default();
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, mut feed, _cancel) = output_runner("file");
    let flush = Duration::from_millis(40);

    let started = Instant::now();
    let task = tokio::spawn(run_batching(
        runner,
        committer.clone(),
        config(flush, 0),
        RotationInterval::DISABLED,
        Arc::clone(&metrics),
    ));

    for i in 0..30 {
        feed.send(&format!("record {i}")).await;
        tokio::time::sleep(Duration::from_millis(7)).await;
    }
    feed.close();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap().unwrap();
    let elapsed = started.elapsed();

    let expected: Vec<String> = (0..30).map(|i| format!("record {i}")).collect();
    assert_eq!(committer.lines(), expected);

    // One timer hand-off per period at most, plus the final one
    let handoffs = metrics.snapshot().handoffs;
    let max = (elapsed.as_millis() / flush.as_millis()) as u64 + 1;
    assert!(handoffs <= max, "{handoffs} hand-offs in {elapsed:?}");
    assert!(committer.committed().len() > 1);
    assert_eq!(feed.in_flight(), 0);
}

#[tokio::test]
async fn test_empty_batches_not_committed() {
    let committer = MemoryCommitter::default();
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, mut feed, _cancel) = output_runner("file");

    let task = tokio::spawn(run_batching(
        runner,
        committer.clone(),
        config(Duration::from_millis(10), 0),
        RotationInterval::DISABLED,
        Arc::clone(&metrics),
    ));

    tokio::time::sleep(Duration::from_millis(80)).await;
    feed.close();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();

    let s = metrics.snapshot();
    assert!(s.handoffs >= 2);
    assert_eq!(s.batches_committed, 0);
    assert_eq!(committer.events(), vec![Event::Close]);
}

#[tokio::test]
async fn test_flush_count_hands_off_early() {
    let committer = MemoryCommitter::default();
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, mut feed, _cancel) = output_runner("file");

    let task = tokio::spawn(run_batching(
        runner,
        committer.clone(),
        config(Duration::from_secs(3600), 3),
        RotationInterval::DISABLED,
        Arc::clone(&metrics),
    ));

    for record in ["a", "b", "c", "d"] {
        feed.send(record).await;
    }

    let committed = timeout(Duration::from_secs(1), async {
        while committer.committed().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(committed.is_ok(), "threshold never triggered a commit");
    assert_eq!(committer.committed()[0], "a\nb\nc\n");

    feed.close();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
    assert_eq!(
        committer.events(),
        vec![
            Event::Commit("a\nb\nc\n".into()),
            Event::Commit("d\n".into()),
            Event::Close,
        ]
    );
}

#[tokio::test]
async fn test_shutdown_commits_partial_batch() {
    let committer = MemoryCommitter::default();
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, feed, cancel) = output_runner("file");

    let task = tokio::spawn(run_batching(
        runner,
        committer.clone(),
        config(Duration::from_secs(3600), 0),
        RotationInterval::DISABLED,
        Arc::clone(&metrics),
    ));

    feed.send("pending").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();

    assert_eq!(
        committer.events(),
        vec![Event::Commit("pending\n".into()), Event::Close]
    );
    assert_eq!(metrics.snapshot().records, 1);
}

#[tokio::test]
async fn test_commit_retried_then_succeeds() {
    let committer = MemoryCommitter::default();
    *committer.failures.lock() = 2;
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, mut feed, _cancel) = output_runner("file");

    let task = tokio::spawn(run_batching(
        runner,
        committer.clone(),
        config(Duration::from_secs(3600), 0),
        RotationInterval::DISABLED,
        Arc::clone(&metrics),
    ));

    feed.send("survives").await;
    feed.close();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();

    assert_eq!(committer.committed(), vec!["survives\n".to_string()]);
    assert_eq!(metrics.snapshot().commit_errors, 0);
}

#[tokio::test]
async fn test_commit_failure_drops_batch_and_continues() {
    let committer = MemoryCommitter::default();
    *committer.failures.lock() = DEFAULT_WRITE_RETRIES;
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, mut feed, _cancel) = output_runner("file");

    let task = tokio::spawn(run_batching(
        runner,
        committer.clone(),
        config(Duration::from_secs(3600), 1),
        RotationInterval::DISABLED,
        Arc::clone(&metrics),
    ));

    feed.send("lost").await;
    feed.send("kept").await;
    feed.close();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();

    assert_eq!(committer.committed(), vec!["kept\n".to_string()]);
    assert_eq!(metrics.snapshot().commit_errors, 1);
}

#[tokio::test]
async fn test_rotation_between_batches() {
    let committer = MemoryCommitter::default();
    let metrics = Arc::new(BatchMetrics::new());
    let (runner, mut feed, _cancel) = output_runner("file");

    // First boundary shortly after start, the next an hour later
    let schedule = RotationSchedule {
        interval: RotationInterval::from_hours(1).unwrap(),
        next: Some(Utc::now() + chrono::Duration::milliseconds(60)),
    };
    let task = tokio::spawn(run_batching_with(
        runner,
        committer.clone(),
        config(Duration::from_secs(3600), 0),
        schedule,
        Arc::clone(&metrics),
    ));

    feed.send("before").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    feed.send("after").await;
    feed.close();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();

    assert_eq!(
        committer.events(),
        vec![
            Event::Commit("before\n".into()),
            Event::Rotate,
            Event::Commit("after\n".into()),
            Event::Close,
        ]
    );
    assert_eq!(metrics.snapshot().rotations, 1);
}
