//! Download trigger.

use crate::error::HarvestResult;
use crate::session::Session;
use tracing::{info, warn};

/// Click every export control on the current page.
///
/// The returned count is only an estimate of the files to expect: a control
/// may produce no download, or several. Zero means the page has nothing to
/// export and is not an error.
pub async fn trigger_downloads(session: &Session, export_selector: &str) -> HarvestResult<usize> {
    let clicked = session.click_all(export_selector).await?;
    if clicked == 0 {
        warn!(
            "no export controls matched `{export_selector}` on {}",
            session.current_url().unwrap_or("<no page>")
        );
    } else {
        info!("triggered {clicked} export control(s)");
    }
    Ok(clicked)
}
