//! Action executor — maps a proposal to driver operations.

use crate::driver::{Driver, Target};
use crate::proposal::{ActionKind, ActionProposal};
use crate::stability;
use tracing::debug;

/// Default scroll distance when the proposal gives none.
const DEFAULT_SCROLL_PX: i64 = 500;

/// Apply a proposal to the page. Returns true when the action went through
/// without error; any failure — missing element, driver error, timeout —
/// comes back as false and never propagates.
pub async fn execute<D: Driver + ?Sized>(
    driver: &D,
    proposal: &ActionProposal,
    timeout_ms: u64,
) -> bool {
    match proposal.kind {
        ActionKind::Click => click(driver, proposal, timeout_ms).await,
        ActionKind::Type => type_into(driver, proposal).await,
        ActionKind::Scroll => scroll(driver, proposal).await,
        ActionKind::Wait => {
            stability::wait_for_stable(driver, 1000, 200).await;
            true
        }
        ActionKind::Submit => submit(driver, proposal, timeout_ms).await,
        // The controller owns advancement; nothing to do on the page.
        ActionKind::Done => true,
    }
}

async fn click<D: Driver + ?Sized>(driver: &D, proposal: &ActionProposal, timeout_ms: u64) -> bool {
    let Some(raw) = proposal.target.as_deref() else {
        debug!("click proposal without a target");
        return false;
    };
    // Primary: treat as a selector. Fallback: visible-text match, which also
    // covers role-labelled buttons.
    let strategies = [Target::selector(raw), Target::text(raw)];
    for target in &strategies {
        match driver.click(target, timeout_ms, false).await {
            Ok(true) => return true,
            Ok(false) => continue,
            Err(e) => {
                debug!("click via {} failed: {}", target, e);
                continue;
            }
        }
    }
    false
}

async fn type_into<D: Driver + ?Sized>(driver: &D, proposal: &ActionProposal) -> bool {
    let (Some(raw), Some(value)) = (proposal.target.as_deref(), proposal.value.as_deref()) else {
        debug!("type proposal missing target or value");
        return false;
    };

    let mut selectors: Vec<String> = vec![raw.to_string()];
    if !raw.starts_with('#') && !raw.starts_with('.') && !raw.starts_with('[') {
        // Bare text likely names a placeholder rather than a selector.
        selectors.push(format!("input[placeholder*={}]", serde_json::json!(raw)));
    }
    selectors.push("input".to_string());

    for selector in &selectors {
        match driver.type_text(selector, value).await {
            Ok(true) => {
                if !proposal.multi_step {
                    // Auto-submit after typing; a failed keypress is not a
                    // failed action.
                    if let Err(e) = driver.press_key("Enter").await {
                        debug!("auto-submit keypress failed: {}", e);
                    }
                }
                return true;
            }
            Ok(false) => continue,
            Err(e) => {
                debug!("fill via '{}' failed: {}", selector, e);
                continue;
            }
        }
    }
    false
}

async fn scroll<D: Driver + ?Sized>(driver: &D, proposal: &ActionProposal) -> bool {
    let result = match proposal.value.as_deref() {
        Some("bottom") => driver.scroll_to_bottom().await,
        Some(raw) => {
            let pixels = raw.parse::<i64>().unwrap_or(DEFAULT_SCROLL_PX);
            driver.scroll_by(pixels).await
        }
        None => driver.scroll_by(DEFAULT_SCROLL_PX).await,
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("scroll failed: {}", e);
            false
        }
    }
}

async fn submit<D: Driver + ?Sized>(
    driver: &D,
    proposal: &ActionProposal,
    timeout_ms: u64,
) -> bool {
    // Prefer an explicit submit control; fall back to the primary key.
    let label = proposal.target.as_deref().unwrap_or("Submit");
    match driver.click(&Target::text(label), timeout_ms, false).await {
        Ok(true) => return true,
        Ok(false) => {}
        Err(e) => debug!("submit click failed: {}", e),
    }
    matches!(driver.press_key("Enter").await, Ok(true))
}
