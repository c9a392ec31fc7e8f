//! Challenge state detection — ordinal extraction and outcome signals from
//! page text, via prioritized pattern matching.

use crate::snapshot::PageSnapshot;
use regex::Regex;
use std::sync::OnceLock;

/// Success/error/completion markers found in page text.
///
/// Success and error can both be present (an ambiguous page); the caller
/// treats that as inconclusive, not as success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSet {
    pub success: bool,
    pub error: bool,
    pub complete: bool,
}

/// What the detector concluded about the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeState {
    /// 1-based challenge ordinal, if any pattern matched.
    pub ordinal: Option<u32>,
    pub success_detected: bool,
    pub error_detected: bool,
    pub all_complete: bool,
}

impl ChallengeState {
    /// Both success and error markers present.
    pub fn is_ambiguous(&self) -> bool {
        self.success_detected && self.error_detected
    }
}

const SUCCESS_MARKERS: &[&str] = &["correct", "success", "well done", "great job", "✓", "✔", "passed"];
const ERROR_MARKERS: &[&str] = &["incorrect", "wrong", "try again", "error", "✗", "✘", "failed"];
const COMPLETE_MARKERS: &[&str] = &[
    "all challenges",
    "congratulations",
    "finished all",
    "30/30",
    "30 of 30",
];

/// Ordinal patterns in strict priority order. The first pattern that
/// matches wins; its leftmost occurrence supplies the capture.
fn ordinal_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // "Step 7 of 30" — the most reliable form.
            Regex::new(r"(?i)step\s+(\d+)\s+of\s+\d+").unwrap(),
            // Bare "7 of 30" / "7/30". Requires the separator, so a revealed
            // code like 555555 can never match.
            Regex::new(r"(?i)\b(\d{1,3})\s*(?:of|/)\s*\d{1,3}\b").unwrap(),
            // "Challenge #7" / "Task 7" / "Level 7".
            Regex::new(r"(?i)(?:challenge|task|level)\s*[#:]?\s*(\d+)").unwrap(),
        ]
    })
}

/// Extract the challenge ordinal from page text, or None when nothing
/// matches. Callers must not substitute a previous ordinal silently.
pub fn extract_ordinal(text: &str) -> Option<u32> {
    for pattern in ordinal_patterns() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(n) = caps[1].parse::<u32>() {
                return Some(n);
            }
        }
    }
    None
}

/// Marker membership. Word markers require non-alphanumeric neighbors, so
/// "incorrect" does not count as "correct"; symbol markers (✓, ✗) match
/// anywhere.
fn contains_marker(lower: &str, marker: &str) -> bool {
    if !marker.chars().any(|c| c.is_alphabetic()) {
        return lower.contains(marker);
    }
    let mut start = 0;
    while let Some(pos) = lower[start..].find(marker) {
        let abs = start + pos;
        let before_ok = lower[..abs]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = lower[abs + marker.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + marker.len();
    }
    false
}

fn contains_any(lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| contains_marker(lower, m))
}

/// Membership tests against the fixed marker vocabularies.
pub fn scan_signals(text: &str) -> SignalSet {
    let lower = text.to_lowercase();
    SignalSet {
        success: contains_any(&lower, SUCCESS_MARKERS),
        error: contains_any(&lower, ERROR_MARKERS),
        complete: contains_any(&lower, COMPLETE_MARKERS),
    }
}

/// Detect challenge ordinal and outcome signals from a snapshot.
pub fn detect_state(snapshot: &PageSnapshot) -> ChallengeState {
    ChallengeState {
        ordinal: extract_ordinal(&snapshot.visible_text),
        success_detected: snapshot.signals.success,
        error_detected: snapshot.signals.error,
        all_complete: snapshot.signals.complete,
    }
}
