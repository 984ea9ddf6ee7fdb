//! Download watcher.
//!
//! The browser writes downloads into the staging directory on its own
//! schedule, so the watcher polls: the page is done once no in-flight
//! transfer marker remains and at least the expected number of new files is
//! present, or once the deadline passes.

use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Point-in-time view of the staging directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StagingSnapshot {
    /// Regular files present, including in-flight ones.
    pub files: usize,
    /// Files still carrying a pending-transfer suffix.
    pub pending: usize,
}

impl StagingSnapshot {
    /// Count the files in `dir`. A missing directory counts as empty.
    pub fn take<S: AsRef<str>>(dir: &Path, pending_suffixes: &[S]) -> io::Result<Self> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        let mut snapshot = Self::default();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            snapshot.files += 1;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if pending_suffixes.iter().any(|s| name.ends_with(s.as_ref())) {
                snapshot.pending += 1;
            }
        }
        Ok(snapshot)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatchOutcome {
    Settled { files: usize, elapsed_ms: u64 },
    TimedOut { files: usize, pending: usize, elapsed_ms: u64 },
}

impl WatchOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, WatchOutcome::Settled { .. })
    }
}

/// Polls a staging directory for completed downloads.
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    poll_interval: Duration,
    deadline: Duration,
    pending_suffixes: Vec<String>,
}

impl DownloadWatcher {
    pub fn new(poll_interval: Duration, deadline: Duration, pending_suffixes: Vec<String>) -> Self {
        Self {
            poll_interval,
            deadline,
            pending_suffixes,
        }
    }

    /// Wait until `baseline + expected_new` files are present with none in
    /// flight, or until the deadline.
    ///
    /// Read errors while polling are treated as "not settled yet". There is no
    /// cancellation: the call returns only on settle or deadline.
    pub async fn wait(&self, dir: &Path, baseline: usize, expected_new: usize) -> WatchOutcome {
        let start = Instant::now();
        let target = baseline + expected_new;
        let mut last = StagingSnapshot::default();

        loop {
            match StagingSnapshot::take(dir, &self.pending_suffixes) {
                Ok(snapshot) => {
                    last = snapshot;
                    if snapshot.pending == 0 && snapshot.files >= target {
                        let elapsed_ms = start.elapsed().as_millis() as u64;
                        info!("downloads settled: {} file(s) after {elapsed_ms}ms", snapshot.files);
                        return WatchOutcome::Settled {
                            files: snapshot.files,
                            elapsed_ms,
                        };
                    }
                }
                Err(e) => debug!("cannot list {}: {e}", dir.display()),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.deadline {
                let elapsed_ms = elapsed.as_millis() as u64;
                warn!(
                    "download deadline of {}ms passed with {}/{target} file(s), {} still in flight",
                    self.deadline.as_millis(),
                    last.files,
                    last.pending
                );
                return WatchOutcome::TimedOut {
                    files: last.files,
                    pending: last.pending,
                    elapsed_ms,
                };
            }

            // Never sleep past the deadline.
            tokio::time::sleep(self.poll_interval.min(self.deadline - elapsed)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn suffixes() -> Vec<String> {
        vec![".crdownload".into(), ".part".into()]
    }

    #[test]
    fn test_snapshot_counts_files_and_pending() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x").unwrap();
        fs::write(dir.path().join("b.csv.crdownload"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let snap = StagingSnapshot::take(dir.path(), &suffixes()).unwrap();
        assert_eq!(snap, StagingSnapshot { files: 2, pending: 1 });
    }

    #[test]
    fn test_snapshot_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = StagingSnapshot::take(&dir.path().join("nope"), &suffixes()).unwrap();
        assert_eq!(snap, StagingSnapshot::default());
    }

    #[tokio::test]
    async fn test_settles_when_expected_files_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x").unwrap();
        fs::write(dir.path().join("b.csv"), "x").unwrap();
        let watcher = DownloadWatcher::new(
            Duration::from_millis(20),
            Duration::from_secs(5),
            suffixes(),
        );
        let outcome = watcher.wait(dir.path(), 0, 2).await;
        assert!(outcome.is_settled());
    }

    #[tokio::test]
    async fn test_waits_for_late_arrival() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fs::write(path.join("late.csv"), "x").unwrap();
        });
        let watcher = DownloadWatcher::new(
            Duration::from_millis(20),
            Duration::from_secs(5),
            suffixes(),
        );
        let outcome = watcher.wait(dir.path(), 0, 1).await;
        writer.await.unwrap();
        assert!(matches!(outcome, WatchOutcome::Settled { files: 1, .. }));
    }

    #[tokio::test]
    async fn test_pending_marker_blocks_settle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x").unwrap();
        fs::write(dir.path().join("b.csv.crdownload"), "x").unwrap();
        let watcher = DownloadWatcher::new(
            Duration::from_millis(20),
            Duration::from_millis(150),
            suffixes(),
        );
        let outcome = watcher.wait(dir.path(), 0, 1).await;
        assert!(matches!(outcome, WatchOutcome::TimedOut { pending: 1, .. }));
    }

    #[tokio::test]
    async fn test_deadline_reported_within_one_interval() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("only.csv"), "x").unwrap();
        let interval = Duration::from_millis(100);
        let deadline = Duration::from_millis(300);
        let watcher = DownloadWatcher::new(interval, deadline, suffixes());

        let started = std::time::Instant::now();
        let outcome = watcher.wait(dir.path(), 0, 3).await;
        let took = started.elapsed();

        assert!(matches!(outcome, WatchOutcome::TimedOut { files: 1, pending: 0, .. }));
        assert!(took >= deadline);
        assert!(took < deadline + interval + Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_baseline_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.csv"), "x").unwrap();
        let watcher = DownloadWatcher::new(
            Duration::from_millis(20),
            Duration::from_millis(100),
            suffixes(),
        );
        let outcome = watcher.wait(dir.path(), 1, 1).await;
        assert!(!outcome.is_settled());
    }
}
