//! Chromium-based renderer using chromiumoxide.

use super::{EvalOutcome, NavigationResult, RenderContext, Renderer};
use crate::config::BrowserOptions;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::handler::Handler;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.harvest/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".harvest/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvest/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvest/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".harvest/chromium/chrome-linux64/chrome"),
                home.join(".harvest/chromium/chrome"),
            ]
        };
        if let Some(c) = candidates.into_iter().find(|c| c.exists()) {
            return Some(c);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer, either launched by us or attached to.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    attached: bool,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance, or attach to one when `connect_url` is set.
    pub async fn connect(options: &BrowserOptions) -> Result<Self> {
        let (browser, handler, attached) = match &options.connect_url {
            Some(url) => {
                let (browser, handler) = Browser::connect(url.clone())
                    .await
                    .with_context(|| format!("failed to attach to browser at {url}"))?;
                (browser, handler, true)
            }
            None => {
                let (browser, handler) = Self::launch(options).await?;
                (browser, handler, false)
            }
        };

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task: spawn_handler(handler),
            attached,
        })
    }

    async fn launch(options: &BrowserOptions) -> Result<(Browser, Handler)> {
        let chrome_path = match &options.executable {
            Some(p) => p.clone(),
            None => find_chromium().context("Chromium not found. Set HARVEST_CHROMIUM_PATH.")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if options.headful {
            builder = builder.with_head();
        } else {
            builder = builder.arg("--headless=new");
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        Browser::launch(config)
            .await
            .context("failed to launch Chromium")
    }
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("browser handler event error: {e}");
            }
        }
    })
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(Box::new(ChromiumContext { page }))
    }

    async fn redirect_downloads(&self, dir: &Path) -> Result<()> {
        let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
        params.download_path = Some(dir.to_string_lossy().into_owned());
        self.browser
            .lock()
            .await
            .execute(params)
            .await
            .context("Browser.setDownloadBehavior failed")?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // Attached browsers belong to someone else; only drop our connection.
        if !self.attached {
            let mut browser = self.browser.lock().await;
            browser.close().await.context("failed to close Chromium")?;
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        Ok(())
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();

        // The load event counts against the same budget as the request.
        let load = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        let result = tokio::time::timeout(timeout, load).await;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }
    }

    async fn evaluate(&self, script: &str) -> EvalOutcome {
        match self.page.evaluate(script).await {
            Ok(result) => EvalOutcome::from_value(result.value().cloned()),
            Err(e) => EvalOutcome::Failed(e.to_string()),
        }
    }

    async fn click_all(&self, selector: &str) -> Result<usize> {
        let controls = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("failed to query export controls `{selector}`"))?;

        let mut clicked = 0;
        for (idx, control) in controls.iter().enumerate() {
            // Mouse click first; fall back to a DOM click for controls that
            // are present but not hit-testable (e.g. covered by an overlay).
            let landed = match control.click().await {
                Ok(_) => true,
                Err(e) => {
                    debug!("mouse click on control {idx} failed ({e}); trying DOM click");
                    control
                        .call_js_fn("function() { this.click(); }", false)
                        .await
                        .map_err(|e| warn!("control {idx} could not be clicked: {e}"))
                        .is_ok()
                }
            };
            if landed {
                clicked += 1;
            }
        }
        Ok(clicked)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}
