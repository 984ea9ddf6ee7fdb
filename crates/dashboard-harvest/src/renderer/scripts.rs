//! Versioned page scripts.
//!
//! Every script sent to the page is a [`ScriptTemplate`]: a named, versioned
//! function body that receives one JSON `params` object and has a single
//! documented return contract. Results are decoded through serde exactly once,
//! here, so call sites never poke at untyped JSON.

use super::EvalOutcome;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A parameterized script with a fixed return contract.
#[derive(Debug, Clone, Copy)]
pub struct ScriptTemplate {
    pub name: &'static str,
    pub version: u32,
    /// Function body; `params` is in scope.
    body: &'static str,
}

impl ScriptTemplate {
    /// Render the template into a self-invoking expression.
    pub fn render<P: Serialize>(&self, params: &P) -> Result<String, serde_json::Error> {
        let params = serde_json::to_string(params)?;
        Ok(format!(
            "/* {}@v{} */ (function(params) {{ {} }})({})",
            self.name, self.version, self.body, params
        ))
    }

    /// Decode an evaluation outcome against this template's contract.
    ///
    /// `Ok(None)` means the script legitimately returned nothing.
    pub fn decode<T: DeserializeOwned>(&self, outcome: EvalOutcome) -> Result<Option<T>, String> {
        match outcome {
            EvalOutcome::Value(v) => serde_json::from_value(v).map(Some).map_err(|e| {
                format!("{}@v{} returned an unexpected shape: {e}", self.name, self.version)
            }),
            EvalOutcome::Absent => Ok(None),
            EvalOutcome::Failed(e) => Err(format!("{}@v{} failed: {e}", self.name, self.version)),
        }
    }
}

/// Returns the page title as a string, or `null` when the title is empty.
///
/// Params: `{}`.
pub const PAGE_TITLE: ScriptTemplate = ScriptTemplate {
    name: "page_title",
    version: 1,
    body: r#"
        const t = (document.title || '').trim();
        return t.length ? t : null;
    "#,
};

/// Parameters for [`WIDGET_SNAPSHOT`].
#[derive(Debug, Clone, Serialize)]
pub struct WidgetSnapshotParams<'a> {
    pub container: &'a str,
    pub heading: &'a str,
    pub header_cell: &'a str,
}

/// One widget container as seen by [`WIDGET_SNAPSHOT`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawWidget {
    /// Text of the first heading-like element, if any.
    pub name: Option<String>,
    /// Raw header cell texts of the container's first table; `None` when the
    /// container holds no table.
    pub headers: Option<Vec<String>>,
}

/// Returns an array of [`RawWidget`] in document order, one per container.
///
/// Header texts are returned raw; normalization happens on the Rust side so
/// DOM headers and file headers share one implementation. `header_cell` is
/// matched inside the table; when it matches nothing the table's first row
/// is used.
pub const WIDGET_SNAPSHOT: ScriptTemplate = ScriptTemplate {
    name: "widget_snapshot",
    version: 1,
    body: r#"
        const text = (el) => (el.innerText || el.textContent || '');
        return Array.from(document.querySelectorAll(params.container)).map((card) => {
            const heading = card.querySelector(params.heading);
            const name = heading ? text(heading) : null;
            const table = card.querySelector('table');
            if (!table) {
                return { name: name, headers: null };
            }
            let cells = Array.from(table.querySelectorAll(params.header_cell));
            if (!cells.length && table.rows.length) {
                cells = Array.from(table.rows[0].cells);
            }
            return { name: name, headers: cells.map(text) };
        });
    "#,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_embeds_params_and_version() {
        let script = WIDGET_SNAPSHOT
            .render(&WidgetSnapshotParams {
                container: ".card",
                heading: "h3",
                header_cell: "th",
            })
            .unwrap();
        assert!(script.starts_with("/* widget_snapshot@v1 */"));
        assert!(script.ends_with(r#"({"container":".card","heading":"h3","header_cell":"th"})"#));
    }

    #[test]
    fn test_render_escapes_selectors() {
        let script = PAGE_TITLE.render(&json!({ "q": "a[title=\"x\"]" })).unwrap();
        assert!(script.contains(r#"a[title=\"x\"]"#));
    }

    #[test]
    fn test_decode_widgets() {
        let outcome = EvalOutcome::Value(json!([
            { "name": "Gainers", "headers": ["Symbol", "Price"] },
            { "name": null, "headers": null }
        ]));
        let widgets: Vec<RawWidget> = WIDGET_SNAPSHOT.decode(outcome).unwrap().unwrap();
        assert_eq!(widgets.len(), 2);
        assert_eq!(widgets[0].headers.as_deref(), Some(&["Symbol".to_string(), "Price".to_string()][..]));
        assert_eq!(widgets[1].name, None);
    }

    #[test]
    fn test_decode_wrong_shape_is_error() {
        let err = WIDGET_SNAPSHOT
            .decode::<Vec<RawWidget>>(EvalOutcome::Value(json!({ "oops": 1 })))
            .unwrap_err();
        assert!(err.contains("widget_snapshot@v1"));
    }

    #[test]
    fn test_decode_absent_and_failed() {
        assert_eq!(PAGE_TITLE.decode::<String>(EvalOutcome::Absent), Ok(None));
        assert!(PAGE_TITLE
            .decode::<String>(EvalOutcome::Failed("ReferenceError".into()))
            .is_err());
    }
}
