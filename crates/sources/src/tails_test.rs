//! Tails input tests

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use conduit_plugin::Input;
use tempfile::TempDir;
use tokio::time::timeout;

use crate::checkpoint::{Checkpoint, path_key};
use crate::tails::{TailsInput, TailsInputConfig};
use crate::test_support::{assert_quiet, common, next_line, runner, settings};

fn tails_settings(logs: &Path, journal: &Path, extra: &str) -> toml::Table {
    settings(&format!(
        "log_directory = \"{}\"\njournal_directory = \"{}\"\npoll_interval = \"10ms\"\nsync_interval = \"20ms\"\n{extra}",
        logs.display(),
        journal.display(),
    ))
}

fn append(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data).unwrap();
    file.sync_all().unwrap();
}

async fn started(logs: &Path, journal: &Path, extra: &str) -> TailsInput {
    let mut input = TailsInput::default();
    input
        .init(&common("tails", "app"), &tails_settings(logs, journal, extra))
        .await
        .unwrap();
    input
}

/// Drain `count` records, returned sorted since files are polled in turn
async fn next_lines(rx: &crossfire::AsyncRx<conduit_plugin::Envelope>, count: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(count);
    for _ in 0..count {
        lines.push(next_line(rx).await);
    }
    lines.sort();
    lines
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_default() {
    let config = TailsInputConfig::default();

    assert_eq!(config.log_directory, Path::new("/var/log"));
    assert!(config.file_match.is_empty());
    assert_eq!(config.rescan_interval, Duration::from_secs(60));
}

#[tokio::test]
async fn test_init_requires_file_match() {
    let dir = TempDir::new().unwrap();
    let mut input = TailsInput::default();
    let err = input
        .init(&common("tails", "app"), &tails_settings(dir.path(), dir.path(), ""))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("file_match"));
}

#[tokio::test]
async fn test_init_rejects_bad_pattern() {
    let dir = TempDir::new().unwrap();
    let mut input = TailsInput::default();
    let err = input
        .init(
            &common("tails", "app"),
            &tails_settings(dir.path(), dir.path(), "file_match = \"(unclosed\""),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("file_match"));
}

#[tokio::test]
async fn test_init_rejects_zero_rescan_interval() {
    let dir = TempDir::new().unwrap();
    let mut input = TailsInput::default();
    let err = input
        .init(
            &common("tails", "app"),
            &tails_settings(dir.path(), dir.path(), "file_match = '.*'\nrescan_interval = \"0s\""),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rescan_interval"));
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_rescan_matches_relative_paths_recursively() {
    let logs = TempDir::new().unwrap();
    let journal = TempDir::new().unwrap();
    append(&logs.path().join("a.log"), b"");
    append(&logs.path().join("nested/b.log"), b"");
    append(&logs.path().join("c.txt"), b"");
    append(&logs.path().join("a.log.1"), b"");

    let mut input = started(logs.path(), journal.path(), r"file_match = '.*\.log'").await;
    assert_eq!(input.rescan("tails").await, 2);
    assert_eq!(
        input.followed(),
        vec![logs.path().join("a.log"), logs.path().join("nested/b.log")]
    );

    // Known files are not added twice
    assert_eq!(input.rescan("tails").await, 0);
}

#[tokio::test]
async fn test_missing_directory_follows_nothing() {
    let dir = TempDir::new().unwrap();
    let mut input = started(&dir.path().join("absent"), dir.path(), "file_match = '.*'").await;
    assert_eq!(input.rescan("tails").await, 0);
    assert!(input.followed().is_empty());
}

// =============================================================================
// Reading
// =============================================================================

#[tokio::test]
async fn test_follows_every_matching_file() {
    let logs = TempDir::new().unwrap();
    let journal = TempDir::new().unwrap();
    append(&logs.path().join("web.log"), b"from web\n");
    append(&logs.path().join("db.log"), b"from db\n");
    append(&logs.path().join("skip.txt"), b"ignored\n");

    let mut input = started(logs.path(), journal.path(), r"file_match = '.*\.log'").await;
    let (runner, rx, cancel) = runner("tails", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    assert_eq!(next_lines(&rx, 2).await, vec!["from db", "from web"]);
    assert_quiet(&rx).await;

    append(&logs.path().join("web.log"), b"more web\n");
    assert_eq!(next_line(&rx).await, "more web");

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_picks_up_new_files_on_rescan() {
    let logs = TempDir::new().unwrap();
    let journal = TempDir::new().unwrap();
    append(&logs.path().join("first.log"), b"one\n");

    let mut input = started(
        logs.path(),
        journal.path(),
        "file_match = '.*\\.log'\nrescan_interval = \"50ms\"",
    )
    .await;
    let (runner, rx, cancel) = runner("tails", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    assert_eq!(next_line(&rx).await, "one");

    append(&logs.path().join("later.log"), b"two\n");
    assert_eq!(next_line(&rx).await, "two");

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_one_checkpoint_per_file() {
    let logs = TempDir::new().unwrap();
    let journal = TempDir::new().unwrap();
    let short = logs.path().join("short.log");
    let long = logs.path().join("long.log");
    append(&short, b"ab\n");
    append(&long, b"abcdef\n");

    let mut input = started(
        logs.path(),
        journal.path(),
        "file_match = '.*\\.log'\nsync_interval = \"1h\"",
    )
    .await;
    let (runner, rx, cancel) = runner("tails", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    assert_eq!(next_lines(&rx, 2).await, vec!["ab", "abcdef"]);

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();

    let read = |path: &Path| Checkpoint::for_key(journal.path(), &path_key(path)).read().unwrap();
    assert_eq!(read(&short), Some(3));
    assert_eq!(read(&long), Some(7));
}

#[tokio::test]
async fn test_resumes_each_file_from_its_checkpoint() {
    let logs = TempDir::new().unwrap();
    let journal = TempDir::new().unwrap();
    let file = logs.path().join("app.log");
    append(&file, b"seen\nunseen\n");
    Checkpoint::for_key(journal.path(), &path_key(&file)).write(5).unwrap();

    let mut input = started(logs.path(), journal.path(), r"file_match = '.*\.log'").await;
    let (runner, rx, cancel) = runner("tails", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    assert_eq!(next_line(&rx).await, "unseen");
    assert_quiet(&rx).await;

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
}
