//! Renderer abstraction for browser-driven dashboards.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The harvest
//! pipeline only ever talks to these traits, so tests can drive it with an
//! in-memory page.

pub mod chromium;
pub mod scripts;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Outcome of evaluating a script in the page.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// The script produced a value.
    Value(serde_json::Value),
    /// The script completed without a value (`undefined` or `null`).
    Absent,
    /// The script threw, or the page could not be queried.
    Failed(String),
}

impl EvalOutcome {
    /// Wrap an optional JSON value, folding `null` into `Absent`.
    pub fn from_value(value: Option<serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => EvalOutcome::Absent,
            Some(v) => EvalOutcome::Value(v),
        }
    }
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Send every future download of this browser into `dir`.
    async fn redirect_downloads(&self, dir: &Path) -> Result<()>;
    /// Shut down the browser engine (or detach from it).
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Evaluate JavaScript in the page context.
    async fn evaluate(&self, script: &str) -> EvalOutcome;
    /// Click every element matching `selector`; returns how many clicks landed.
    async fn click_all(&self, selector: &str) -> Result<usize>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
