//! Schema snapshot: which widget owns which header signature.
//!
//! The snapshot must be taken before any export control is clicked. Export
//! buttons can re-render their cards, and a map built afterwards would
//! describe a different DOM than the one the downloads came from.

use crate::config::WidgetSelectors;
use crate::error::{HarvestError, HarvestResult};
use crate::renderer::scripts::{RawWidget, WidgetSnapshotParams, WIDGET_SNAPSHOT};
use crate::session::Session;
use crate::signature::{sanitize_widget_name, Signature, SignatureNormalizer};
use std::collections::HashMap;
use tracing::{debug, info};

/// Signature → widget name for one page visit. Last insert wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMap {
    entries: HashMap<Signature, String>,
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping, returning the widget name it displaced.
    pub fn insert(&mut self, signature: Signature, widget: String) -> Option<String> {
        self.entries.insert(signature, widget)
    }

    pub fn get(&self, signature: &Signature) -> Option<&str> {
        self.entries.get(signature).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Signature, &str)> {
        self.entries.iter().map(|(s, w)| (s, w.as_str()))
    }
}

/// Build a schema map from widgets already read off the page.
///
/// Untitled widgets are named `untitled_<n>` after their 1-based position.
/// Widgets without a table, or whose header row normalizes to nothing, are
/// skipped.
pub fn build_schema_map(widgets: &[RawWidget], normalizer: &SignatureNormalizer) -> SchemaMap {
    let mut map = SchemaMap::new();
    for (idx, widget) in widgets.iter().enumerate() {
        let name = widget
            .name
            .as_deref()
            .and_then(sanitize_widget_name)
            .unwrap_or_else(|| format!("untitled_{}", idx + 1));

        let Some(headers) = &widget.headers else {
            debug!("widget {name} has no table; skipped");
            continue;
        };
        let Some(signature) = normalizer.signature(headers) else {
            debug!("widget {name} has an empty header row; skipped");
            continue;
        };

        if let Some(previous) = map.insert(signature.clone(), name.clone()) {
            debug!("signature [{signature}] moved from {previous} to {name}");
        }
    }
    map
}

/// Read every widget on the current page and build its schema map.
pub async fn extract_schema_map(
    session: &Session,
    selectors: &WidgetSelectors,
    normalizer: &SignatureNormalizer,
) -> HarvestResult<SchemaMap> {
    let url = session.current_url().unwrap_or("<no page>").to_string();
    let params = WidgetSnapshotParams {
        container: &selectors.container,
        heading: &selectors.heading,
        header_cell: &selectors.header_cell,
    };

    let widgets: Vec<RawWidget> = session
        .evaluate(&WIDGET_SNAPSHOT, &params)
        .await
        .map_err(|reason| HarvestError::Extraction {
            url: url.clone(),
            reason,
        })?
        .ok_or_else(|| HarvestError::Extraction {
            url: url.clone(),
            reason: "widget snapshot returned no result".into(),
        })?;

    let map = build_schema_map(&widgets, normalizer);
    info!(
        "snapshot of {url}: {} container(s), {} distinct schema(s)",
        widgets.len(),
        map.len()
    );
    Ok(map)
}
