//! Run report: what happened on each page.

use crate::router::RouteReport;
use crate::watcher::WatchOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// How a page visit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    /// Downloads were triggered and routed (possibly after a watcher timeout).
    Routed,
    /// No export control was found; nothing was watched or routed.
    NoExports,
    /// The page was skipped after an error.
    Failed { reason: String },
}

/// Outcome of one target page.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub url: String,
    pub dashboard: Option<String>,
    pub status: PageStatus,
    /// Distinct schemas in the snapshot.
    pub schemas: usize,
    /// Export controls invoked.
    pub triggered: usize,
    pub watch: Option<WatchOutcome>,
    pub routing: RouteReport,
    /// Files still in staging after the page was done, discarded before
    /// the next page.
    pub leftovers: usize,
}

impl PageReport {
    pub fn failed(url: &str, reason: String) -> Self {
        Self {
            url: url.to_string(),
            dashboard: None,
            status: PageStatus::Failed { reason },
            schemas: 0,
            triggered: 0,
            watch: None,
            routing: RouteReport::default(),
            leftovers: 0,
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Successful navigations, retries excluded.
    pub pages_navigated: usize,
    /// Lifetime of the browser tab in milliseconds.
    pub session_ms: u64,
    pub pages: Vec<PageReport>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            pages_navigated: 0,
            session_ms: 0,
            pages: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Files filed into the output tree across all pages.
    pub fn matched(&self) -> usize {
        self.pages.iter().map(|p| p.routing.matched.len()).sum()
    }

    pub fn unmatched(&self) -> usize {
        self.pages.iter().map(|p| p.routing.unmatched.len()).sum()
    }

    pub fn failed_files(&self) -> usize {
        self.pages.iter().map(|p| p.routing.failed.len()).sum()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Failed { .. }))
            .count()
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::UnmatchedFile;
    use std::path::PathBuf;

    #[test]
    fn test_totals_and_json_shape() {
        let mut report = RunReport::start();
        let mut page = PageReport::failed("https://a.example/1", "boom".into());
        page.routing.unmatched.push(UnmatchedFile {
            path: PathBuf::from("/s/x.csv"),
            signature: None,
        });
        report.pages.push(page);
        report.pages.push(PageReport {
            status: PageStatus::NoExports,
            ..PageReport::failed("https://a.example/2", String::new())
        });
        report.finish();

        assert_eq!(report.unmatched(), 1);
        assert_eq!(report.failed_pages(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pages"][0]["status"]["status"], "failed");
        assert_eq!(json["pages"][0]["status"]["reason"], "boom");
        assert_eq!(json["pages"][1]["status"]["status"], "no_exports");
    }

    #[test]
    fn test_write_json_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/run.json");
        RunReport::start().write_json(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("started_at"));
    }
}
