//! The browser session a harvest run drives.
//!
//! A session owns one browser context (tab) for the whole run. It is opened
//! once, navigated to each target in turn, and closed explicitly at the end;
//! the orchestrator passes it around by `&mut` rather than keeping it in
//! global state.

use crate::error::{HarvestError, HarvestResult};
use crate::renderer::scripts::ScriptTemplate;
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use crate::retry::RetryPolicy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A live browser tab plus bookkeeping about where it has been.
pub struct Session {
    context: Box<dyn RenderContext>,
    opened_at: Instant,
    current_url: Option<String>,
    pages_visited: usize,
}

impl Session {
    /// Open a new tab on `renderer`.
    pub async fn open(renderer: &dyn Renderer) -> HarvestResult<Self> {
        let context = renderer
            .new_context()
            .await
            .map_err(|e| HarvestError::Connection(format!("{e:#}")))?;
        Ok(Self::from_context(context))
    }

    /// Wrap an existing context.
    pub fn from_context(context: Box<dyn RenderContext>) -> Self {
        Self {
            context,
            opened_at: Instant::now(),
            current_url: None,
            pages_visited: 0,
        }
    }

    /// Navigate to `url`, retrying per `policy`.
    pub async fn navigate(
        &mut self,
        url: &str,
        policy: &RetryPolicy,
        timeout: Duration,
    ) -> HarvestResult<NavigationResult> {
        let context = self.context.as_ref();
        let nav = policy
            .run(&format!("navigate {url}"), |attempt| {
                debug!("navigating to {url} (attempt {attempt})");
                context.navigate(url, timeout)
            })
            .await
            .map_err(|exhausted| HarvestError::Navigation {
                url: url.to_string(),
                attempts: exhausted.attempts,
                reason: format!("{:#}", exhausted.last_error),
            })?;

        info!(
            "loaded {} in {}ms",
            nav.final_url, nav.load_time_ms
        );
        self.current_url = Some(nav.final_url.clone());
        self.pages_visited += 1;
        Ok(nav)
    }

    /// Run a script template and decode its result.
    ///
    /// `Ok(None)` means the script returned nothing; `Err` carries the
    /// evaluation failure or contract violation.
    pub async fn evaluate<P, T>(&self, template: &ScriptTemplate, params: &P) -> Result<Option<T>, String>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let script = template.render(params).map_err(|e| e.to_string())?;
        let outcome = self.context.evaluate(&script).await;
        template.decode(outcome)
    }

    /// Click every element matching `selector`.
    pub async fn click_all(&self, selector: &str) -> HarvestResult<usize> {
        self.context
            .click_all(selector)
            .await
            .map_err(|e| HarvestError::Browser(format!("{e:#}")))
    }

    /// The URL of the last successful navigation.
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Close the session and release the browser context.
    pub async fn close(self) -> HarvestResult<()> {
        self.context
            .close()
            .await
            .map_err(|e| HarvestError::Browser(format!("{e:#}")))
    }
}
