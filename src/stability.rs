//! Stability wait — poll until page content stops changing, under a hard
//! wall-clock ceiling.

use crate::driver::Driver;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Ceiling on a single content sample. A hung read must not stall the wait
/// beyond this, whatever the driver's own timeouts claim.
const SAMPLE_CEILING_MS: u64 = 1000;

/// Poll the page's serialized markup until two consecutive samples are
/// identical (true) or `timeout_ms` of wall clock elapses (false).
///
/// The overall deadline is enforced by clock comparison on every iteration,
/// never by counting samples: one slow sample must not extend the total
/// wait. Each sample is additionally bounded by the smaller of the
/// per-sample ceiling and the remaining budget; a failed or timed-out
/// sample counts as "changed" and polling continues.
pub async fn wait_for_stable<D: Driver + ?Sized>(
    driver: &D,
    timeout_ms: u64,
    poll_interval_ms: u64,
) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut last: Option<String> = None;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }

        let budget = (deadline - now).min(Duration::from_millis(SAMPLE_CEILING_MS));
        let sample = match tokio::time::timeout(budget, driver.markup()).await {
            Ok(Ok(markup)) => Some(markup),
            Ok(Err(e)) => {
                debug!("content sample failed: {}", e);
                None
            }
            Err(_) => {
                debug!("content sample exceeded {}ms", budget.as_millis());
                None
            }
        };

        if let (Some(prev), Some(cur)) = (&last, &sample) {
            if prev == cur {
                return true;
            }
        }
        last = sample;

        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
    }
}
