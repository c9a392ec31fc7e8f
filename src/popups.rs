//! Popup dismissal — bounded rounds of priority-ordered overlay closing.

use crate::driver::{Driver, Target};
use std::time::Duration;
use tracing::debug;

/// Per-click budget. Forced clicks bypass actionability checks, so this only
/// guards against a wedged driver.
const CLICK_TIMEOUT_MS: u64 = 1000;

/// Closable-overlay candidates in strict priority order.
///
/// Higher tiers are less likely to be deceptive: cookie banners must go
/// first (they block everything else), then real close glyphs and
/// positioned/labelled close buttons. Textual "Dismiss"/"Close" controls
/// are sometimes decoys that reopen or relocate popups, so they come last.
fn candidates() -> Vec<Target> {
    vec![
        // Tier 1: cookie consent accepts.
        Target::text("Accept All"),
        Target::text("Accept"),
        Target::text("I Agree"),
        // Tier 2: explicit close glyphs.
        Target::text("×"),
        Target::text("✕"),
        Target::text("✖"),
        // Tier 3: visually positioned modal-close controls.
        Target::selector("button[style*='position: absolute'][style*='top'][style*='right']"),
        Target::selector("button.absolute"),
        Target::selector("button[class*='close']"),
        // Tier 4: accessible close labels.
        Target::selector("button[aria-label*='close' i]"),
        Target::selector("button[aria-label*='dismiss' i]"),
        // Tier 5: textual controls, last resort.
        Target::text("Dismiss"),
        Target::text("Close"),
    ]
}

/// Repeatedly close overlay elements until a full round finds nothing or
/// `max_attempts` rounds are spent. Returns the number of clicks performed.
///
/// Each round clicks at most the first matching candidate, waits `settle_ms`
/// for animations, then restarts from the top tier; a successful low-tier
/// click may have revealed a higher-tier popup underneath. Individual click
/// failures are swallowed and treated as "no match".
pub async fn dismiss_popups<D: Driver + ?Sized>(
    driver: &D,
    max_attempts: u32,
    settle_ms: u64,
) -> u32 {
    let mut dismissed = 0;
    for round in 0..max_attempts {
        let mut clicked = false;
        for target in candidates() {
            match driver.click(&target, CLICK_TIMEOUT_MS, true).await {
                Ok(true) => {
                    debug!("popup round {}: closed via {}", round + 1, target);
                    dismissed += 1;
                    clicked = true;
                    tokio::time::sleep(Duration::from_millis(settle_ms)).await;
                    break;
                }
                Ok(false) => continue,
                Err(e) => {
                    debug!("popup click {} failed: {}", target, e);
                    continue;
                }
            }
        }
        if !clicked {
            break;
        }
    }
    dismissed
}
