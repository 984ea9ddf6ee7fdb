//! `harvest run` — harvest every configured dashboard once.

use crate::config::{HarvestConfig, PageFailurePolicy};
use crate::report::{PageStatus, RunReport};
use anyhow::Result;
use std::path::PathBuf;

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub config: Option<PathBuf>,
    pub targets: Vec<String>,
    pub output_root: Option<PathBuf>,
    pub staging_root: Option<PathBuf>,
    pub settle_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
    pub connect: Option<String>,
    pub skip_failed_pages: bool,
    pub report: Option<PathBuf>,
}

/// Resolve the effective configuration: file (or defaults), then flags.
pub fn resolve_config(overrides: RunOverrides) -> Result<HarvestConfig> {
    let mut config = match &overrides.config {
        Some(path) => HarvestConfig::from_file(path)?,
        None => HarvestConfig::default(),
    };

    if !overrides.targets.is_empty() {
        config.targets = overrides.targets;
    }
    if let Some(dir) = overrides.output_root {
        config.output_root = dir;
    }
    if let Some(dir) = overrides.staging_root {
        config.staging_root = dir;
    }
    if let Some(ms) = overrides.settle_ms {
        config.settle_delay_ms = ms;
    }
    if let Some(ms) = overrides.deadline_ms {
        config.download_deadline_ms = ms;
    }
    if overrides.connect.is_some() {
        config.browser.connect_url = overrides.connect;
    } else if let Ok(url) = std::env::var("HARVEST_BROWSER_URL") {
        config.browser.connect_url = Some(url);
    }
    if overrides.skip_failed_pages {
        config.page_failure = PageFailurePolicy::Skip;
    }
    if overrides.report.is_some() {
        config.report_path = overrides.report;
    }

    config.validate()?;
    Ok(config)
}

/// Run the harvest and print a summary.
pub async fn run(overrides: RunOverrides, json: bool) -> Result<()> {
    let config = resolve_config(overrides)?;
    let report = crate::orchestrator::run(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for page in &report.pages {
        let name = page.dashboard.as_deref().unwrap_or("-");
        match &page.status {
            PageStatus::Routed => {
                let timed_out = page.watch.map(|w| !w.is_settled()).unwrap_or(false);
                println!(
                    "  [OK] {name}: {} filed, {} discarded, {} failed{}",
                    page.routing.matched.len(),
                    page.routing.unmatched.len(),
                    page.routing.failed.len(),
                    if timed_out { " (download deadline hit)" } else { "" }
                );
            }
            PageStatus::NoExports => println!("  [--] {name}: no export controls"),
            PageStatus::Failed { reason } => println!("  [!!] {}: {reason}", page.url),
        }
    }
    println!();
    println!(
        "  {} file(s) filed across {} page(s)",
        report.matched(),
        report.pages.len()
    );
}
