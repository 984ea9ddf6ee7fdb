// Copyright 2026 Dashboard Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! One harvest run over every configured target page.
//!
//! Per page: navigate (with retry) → settle → snapshot → trigger →
//! watch → route. Pages are handled strictly one after another on a single
//! browser tab. The staging directory is emptied before the first page and
//! after each page, and removed after the last one, whichever way the run
//! ends.

use crate::config::{HarvestConfig, PageFailurePolicy};
use crate::error::{HarvestError, HarvestResult};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::scripts::PAGE_TITLE;
use crate::renderer::Renderer;
use crate::report::{PageReport, PageStatus, RunReport};
use crate::retry::RetryPolicy;
use crate::router::{FileRouter, RouteReport};
use crate::session::Session;
use crate::signature::{dashboard_name, SignatureNormalizer};
use crate::snapshot::extract_schema_map;
use crate::staging::{clear_leftovers, StagingArea};
use crate::trigger::trigger_downloads;
use crate::watcher::{DownloadWatcher, StagingSnapshot};
use std::path::Path;
use tracing::{error, info, warn};

/// Fallback folder name when neither title nor URL yields one.
const FALLBACK_DASHBOARD: &str = "dashboard";

/// Connect to a browser per `config.browser` and run a full harvest.
pub async fn run(config: HarvestConfig) -> HarvestResult<RunReport> {
    config.validate()?;

    info!("connecting to browser");
    let renderer = ChromiumRenderer::connect(&config.browser)
        .await
        .map_err(|e| HarvestError::Connection(format!("{e:#}")))?;

    let harvester = Harvester::new(config);
    let result = harvester.run_with(&renderer).await;

    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    result
}

/// Drives harvest runs against any [`Renderer`].
pub struct Harvester {
    config: HarvestConfig,
    normalizer: SignatureNormalizer,
    navigation_retry: RetryPolicy,
    watcher: DownloadWatcher,
    router: FileRouter,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        // One normalizer value, shared by snapshot and router.
        let normalizer = config.normalizer();
        let navigation_retry = RetryPolicy::from_millis(&config.navigation_backoff_ms);
        let watcher = DownloadWatcher::new(
            config.poll_interval(),
            config.download_deadline(),
            config.pending_suffixes.clone(),
        );
        let router = FileRouter::new(
            config.output_root.clone(),
            &config.accepted_extensions,
            normalizer.clone(),
        );
        Self {
            config,
            normalizer,
            navigation_retry,
            watcher,
            router,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run every target on `renderer`.
    ///
    /// The staging directory is recreated up front and removed before this
    /// returns, on success and on failure.
    pub async fn run_with(&self, renderer: &dyn Renderer) -> HarvestResult<RunReport> {
        self.config.validate()?;
        let staging = StagingArea::prepare(&self.config.staging_root)?;

        let outcome = self.run_in(renderer, staging.path()).await;

        match (outcome, staging.cleanup()) {
            (Ok(report), Ok(())) => {
                if let Some(path) = &self.config.report_path {
                    if let Err(e) = report.write_json(path) {
                        warn!("{e:#}");
                    }
                }
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), cleanup) => {
                if let Err(c) = cleanup {
                    warn!("{c}");
                }
                error!("harvest aborted: {e}");
                Err(e)
            }
        }
    }

    async fn run_in(&self, renderer: &dyn Renderer, staging: &Path) -> HarvestResult<RunReport> {
        renderer
            .redirect_downloads(staging)
            .await
            .map_err(|e| HarvestError::Connection(format!("{e:#}")))?;
        let mut session = Session::open(renderer).await?;

        let result = self.visit_all(&mut session, staging).await.map(|mut report| {
            report.pages_navigated = session.pages_visited();
            report.session_ms = session.age().as_millis() as u64;
            report
        });

        info!(
            "closing browser tab after {} page(s), {}s",
            session.pages_visited(),
            session.age().as_secs()
        );
        if let Err(e) = session.close().await {
            warn!("failed to close browser tab: {e}");
        }
        result
    }

    async fn visit_all(&self, session: &mut Session, staging: &Path) -> HarvestResult<RunReport> {
        let mut report = RunReport::start();
        let total = self.config.targets.len();

        for (idx, url) in self.config.targets.iter().enumerate() {
            info!("[{}/{total}] {url}", idx + 1);
            let mut page = match self.visit(session, url, staging).await {
                Ok(page) => page,
                Err(e) if !e.is_run_fatal() && self.config.page_failure == PageFailurePolicy::Skip => {
                    error!("skipping {url}: {e}");
                    PageReport::failed(url, e.to_string())
                }
                Err(e) => return Err(e),
            };
            // Whatever the router left behind (late or partial downloads,
            // other file types, unreadable files) must not reach the next page.
            page.leftovers = clear_leftovers(staging)
                .map_err(|source| HarvestError::Staging {
                    path: staging.to_path_buf(),
                    source,
                })?
                .len();
            report.pages.push(page);
        }

        report.finish();
        info!(
            "harvest finished: {} file(s) filed, {} discarded, {} failed, {} page(s) failed",
            report.matched(),
            report.unmatched(),
            report.failed_files(),
            report.failed_pages()
        );
        Ok(report)
    }

    /// One full cycle on one page.
    pub async fn visit(&self, session: &mut Session, url: &str, staging: &Path) -> HarvestResult<PageReport> {
        session
            .navigate(url, &self.navigation_retry, self.config.navigation_timeout())
            .await?;

        tokio::time::sleep(self.config.settle_delay()).await;

        let dashboard = self.dashboard_name(session, url).await;
        let schema = extract_schema_map(session, &self.config.selectors, &self.normalizer).await?;

        // Baseline must be taken before anything is clicked.
        let baseline = StagingSnapshot::take(staging, &self.config.pending_suffixes)
            .map_err(|source| HarvestError::Staging {
                path: staging.to_path_buf(),
                source,
            })?
            .files;

        let triggered = trigger_downloads(session, &self.config.selectors.export_control).await?;
        if triggered == 0 {
            warn!("{dashboard}: nothing to export; skipping watch and routing");
            return Ok(PageReport {
                url: url.to_string(),
                dashboard: Some(dashboard),
                status: PageStatus::NoExports,
                schemas: schema.len(),
                triggered: 0,
                watch: None,
                routing: RouteReport::default(),
                leftovers: 0,
            });
        }

        let watch = self.watcher.wait(staging, baseline, triggered).await;
        let routing = self
            .router
            .route(staging, &schema, &dashboard)
            .map_err(|source| HarvestError::Staging {
                path: staging.to_path_buf(),
                source,
            })?;

        Ok(PageReport {
            url: url.to_string(),
            dashboard: Some(dashboard),
            status: PageStatus::Routed,
            schemas: schema.len(),
            triggered,
            watch: Some(watch),
            routing,
            leftovers: 0,
        })
    }

    /// Folder name for the current page: sanitized title, else the last URL
    /// path segment, else a fixed fallback.
    async fn dashboard_name(&self, session: &Session, url: &str) -> String {
        let title: Option<String> = match session.evaluate(&PAGE_TITLE, &serde_json::json!({})).await {
            Ok(title) => title,
            Err(e) => {
                warn!("could not read page title: {e}");
                None
            }
        };

        title
            .and_then(|t| dashboard_name(&t, &self.config.title_suffixes))
            .or_else(|| name_from_url(session.current_url().unwrap_or(url)))
            .unwrap_or_else(|| FALLBACK_DASHBOARD.to_string())
    }
}

fn name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();
    dashboard_name::<&str>(&segment, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url_uses_last_segment() {
        assert_eq!(
            name_from_url("https://chartink.com/dashboard/208000/").as_deref(),
            Some("208000")
        );
        assert_eq!(
            name_from_url("https://example.com/boards/swing%20setups").as_deref(),
            Some("swing_20setups")
        );
        assert_eq!(name_from_url("https://example.com/"), None);
        assert_eq!(name_from_url("not a url"), None);
    }
}
