//! Run configuration: loading, defaults, and validation.

use crate::error::{HarvestError, HarvestResult};
use crate::signature::{SignatureNormalizer, DEFAULT_SORT_HINTS, DEFAULT_TITLE_SUFFIXES};
use crate::staging;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do when a single page fails to navigate or yield a schema map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFailurePolicy {
    /// Stop the run and return the error.
    #[default]
    Abort,
    /// Record the page as failed and continue with the next target.
    Skip,
}

/// CSS selectors describing how widgets are laid out on a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSelectors {
    /// One element per exportable widget (a titled card with one table).
    pub container: String,
    /// Heading-like element inside a container; the first match names it.
    pub heading: String,
    /// Header cells of the container's table, in column order.
    pub header_cell: String,
    /// Controls that start an export download.
    pub export_control: String,
}

impl Default for WidgetSelectors {
    fn default() -> Self {
        Self {
            container: ".card, .widget".into(),
            heading: "h1, h2, h3, h4, h5, h6, .card-title, .widget-title".into(),
            header_cell: "table thead tr:first-child th".into(),
            export_control: "button.buttons-csv, a.buttons-csv, [data-export=\"csv\"]".into(),
        }
    }
}

/// How the browser session is obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Attach to an already running browser (DevTools HTTP or WebSocket URL)
    /// instead of launching one.
    pub connect_url: Option<String>,
    /// Explicit Chromium executable; discovered when absent.
    pub executable: Option<PathBuf>,
    /// Show the browser window when launching.
    pub headful: bool,
}

/// Immutable configuration for one harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Page addresses, visited once each, in order.
    pub targets: Vec<String>,
    /// Root of the `<dashboard>/<widget>.<ext>` output tree.
    pub output_root: PathBuf,
    /// Scratch directory the browser downloads into. Wiped at run start and end.
    pub staging_root: PathBuf,
    /// Pause after navigation before the schema snapshot.
    pub settle_delay_ms: u64,
    /// Maximum time the watcher waits for downloads on one page.
    pub download_deadline_ms: u64,
    /// Watcher polling interval.
    pub poll_interval_ms: u64,
    /// Timeout of a single navigation attempt.
    pub navigation_timeout_ms: u64,
    /// Delays between navigation attempts; attempts = len + 1.
    pub navigation_backoff_ms: Vec<u64>,
    /// Extensions the router picks up, without the dot.
    pub accepted_extensions: Vec<String>,
    /// Suffixes the browser gives files that are still being written.
    pub pending_suffixes: Vec<String>,
    /// Page-title suffixes stripped from dashboard names.
    pub title_suffixes: Vec<String>,
    /// Instructional header text cut from labels before hashing.
    pub sort_hints: Vec<String>,
    pub selectors: WidgetSelectors,
    pub browser: BrowserOptions,
    pub page_failure: PageFailurePolicy,
    /// Where to write the JSON run report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            output_root: PathBuf::from("harvest"),
            staging_root: std::env::temp_dir().join("dashboard-harvest-staging"),
            settle_delay_ms: 5_000,
            download_deadline_ms: 30_000,
            poll_interval_ms: 250,
            navigation_timeout_ms: 30_000,
            navigation_backoff_ms: vec![2_000, 5_000, 10_000],
            accepted_extensions: vec!["csv".into(), "tsv".into()],
            pending_suffixes: vec![
                ".crdownload".into(),
                ".part".into(),
                ".download".into(),
                ".tmp".into(),
            ],
            title_suffixes: DEFAULT_TITLE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            sort_hints: DEFAULT_SORT_HINTS.iter().map(|s| s.to_string()).collect(),
            selectors: WidgetSelectors::default(),
            browser: BrowserOptions::default(),
            page_failure: PageFailurePolicy::default(),
            report_path: None,
        }
    }
}

impl HarvestConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> HarvestResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(raw: &str) -> HarvestResult<Self> {
        serde_json::from_str(raw).map_err(|e| HarvestError::Config(e.to_string()))
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.targets.is_empty() {
            return Err(HarvestError::Config("no target pages configured".into()));
        }
        if let Some(bad) = self.targets.iter().find(|t| t.trim().is_empty()) {
            return Err(HarvestError::Config(format!("empty target address: {bad:?}")));
        }
        if self.poll_interval_ms == 0 {
            return Err(HarvestError::Config("poll_interval_ms must be positive".into()));
        }
        if self.accepted_extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(HarvestError::Config("no accepted extensions".into()));
        }
        if self.staging_root.as_os_str().is_empty() {
            return Err(HarvestError::Config("staging_root is empty".into()));
        }
        // The staging root is wiped, so it must never overlap the output tree.
        // Compare resolved paths: `out` and `/cwd/out/..` are the same place.
        let resolve = |label: &str, path: &Path| {
            staging::resolve(path).map_err(|e| {
                HarvestError::Config(format!("cannot resolve {label} {}: {e}", path.display()))
            })
        };
        let staging_root = resolve("staging_root", &self.staging_root)?;
        let output_root = resolve("output_root", &self.output_root)?;
        staging::ensure_disposable(&staging_root).map_err(|e| {
            HarvestError::Config(format!("staging_root {}: {e}", self.staging_root.display()))
        })?;
        if staging_root.starts_with(&output_root) || output_root.starts_with(&staging_root) {
            return Err(HarvestError::Config(format!(
                "staging_root {} and output_root {} overlap",
                self.staging_root.display(),
                self.output_root.display()
            )));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn download_deadline(&self) -> Duration {
        Duration::from_millis(self.download_deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// The normalizer shared by snapshot extraction and file routing.
    pub fn normalizer(&self) -> SignatureNormalizer {
        SignatureNormalizer::with_hints(self.sort_hints.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> HarvestConfig {
        HarvestConfig {
            targets: vec!["https://chartink.com/dashboard/1".into()],
            output_root: PathBuf::from("/data/out"),
            staging_root: PathBuf::from("/data/staging"),
            ..HarvestConfig::default()
        }
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let cfg = HarvestConfig::from_json(
            r#"{ "targets": ["https://a.example/d"], "settle_delay_ms": 100,
                 "page_failure": "skip", "selectors": { "container": ".tile" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.targets.len(), 1);
        assert_eq!(cfg.settle_delay(), Duration::from_millis(100));
        assert_eq!(cfg.page_failure, PageFailurePolicy::Skip);
        assert_eq!(cfg.selectors.container, ".tile");
        assert_eq!(cfg.selectors.heading, WidgetSelectors::default().heading);
        assert_eq!(cfg.navigation_backoff_ms, vec![2_000, 5_000, 10_000]);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            HarvestConfig::from_json("{ targets: "),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_targets() {
        let cfg = HarvestConfig {
            targets: vec![],
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlapping_roots() {
        let nested = HarvestConfig {
            staging_root: PathBuf::from("/data/out/staging"),
            ..valid()
        };
        assert!(nested.validate().is_err());
        let same = HarvestConfig {
            staging_root: PathBuf::from("/data/out"),
            ..valid()
        };
        assert!(same.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_through_parent_components() {
        let root = tempfile::tempdir().unwrap();
        let cfg = HarvestConfig {
            output_root: root.path().join("out"),
            staging_root: root.path().join("a/.."),
            ..valid()
        };
        assert!(matches!(cfg.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_relative_output_inside_absolute_staging() {
        let cwd = std::env::current_dir().unwrap();
        let cfg = HarvestConfig {
            output_root: PathBuf::from("harvest-out"),
            staging_root: cwd.join("harvest-out").join("staging"),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_working_directory_as_staging() {
        let cfg = HarvestConfig {
            output_root: PathBuf::from("harvest"),
            staging_root: PathBuf::from("."),
            ..valid()
        };
        assert!(cfg.validate().is_err());
        let root = HarvestConfig {
            staging_root: PathBuf::from("/"),
            ..valid()
        };
        assert!(root.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let cfg = HarvestConfig {
            poll_interval_ms: 0,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_normalizer_uses_configured_hints() {
        let cfg = HarvestConfig {
            sort_hints: vec!["(sortable)".into()],
            ..valid()
        };
        let n = cfg.normalizer();
        assert_eq!(n.normalize_label("Price (sortable)"), "Price");
    }
}
