//! Page state snapshot — a serialized description of the current page.

use crate::detect::{self, SignalSet};
use crate::driver::{Driver, PageElement};
use tracing::debug;

/// Limit on visible text fed to the LLM prompt.
const MAX_PROMPT_TEXT: usize = 2000;
/// Limit on elements fed to the LLM prompt.
const MAX_PROMPT_ELEMENTS: usize = 30;

/// Immutable view of the page at one loop iteration.
///
/// Rebuilt fresh every iteration; never mutated, only replaced.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// Visible text content of the page.
    pub visible_text: String,
    /// Interactive elements in document order.
    pub elements: Vec<PageElement>,
    /// Success/error/completion markers found in the text.
    pub signals: SignalSet,
    /// True when the driver could not be queried (page crashed/detached).
    pub unavailable: bool,
}

impl PageSnapshot {
    /// Capture the current page state. Never fails: on driver-level failure
    /// the snapshot comes back empty with `unavailable` set, so the caller
    /// decides whether to retry or abort.
    pub async fn capture<D: Driver + ?Sized>(driver: &D) -> PageSnapshot {
        let visible_text = match driver.visible_text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("snapshot: page text unavailable: {}", e);
                return PageSnapshot::unavailable();
            }
        };
        let elements = match driver.interactive_elements().await {
            Ok(els) => els,
            Err(e) => {
                debug!("snapshot: element query failed: {}", e);
                return PageSnapshot::unavailable();
            }
        };
        let signals = detect::scan_signals(&visible_text);
        PageSnapshot {
            visible_text,
            elements,
            signals,
            unavailable: false,
        }
    }

    fn unavailable() -> PageSnapshot {
        PageSnapshot {
            visible_text: String::new(),
            elements: Vec::new(),
            signals: SignalSet::default(),
            unavailable: true,
        }
    }

    /// Visible text truncated for LLM consumption.
    pub fn prompt_text(&self) -> &str {
        let end = self
            .visible_text
            .char_indices()
            .map(|(i, _)| i)
            .nth(MAX_PROMPT_TEXT)
            .unwrap_or(self.visible_text.len());
        &self.visible_text[..end]
    }

    /// Compact element list for LLM consumption, one line each.
    pub fn element_list(&self) -> String {
        if self.elements.is_empty() {
            return "No interactive elements found".into();
        }
        let mut out = String::with_capacity(self.elements.len() * 40);
        for (i, el) in self.elements.iter().take(MAX_PROMPT_ELEMENTS).enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, el));
        }
        if self.elements.len() > MAX_PROMPT_ELEMENTS {
            out.push_str(&format!("[...{} total elements]\n", self.elements.len()));
        }
        out
    }
}
