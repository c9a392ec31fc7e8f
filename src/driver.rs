//! Browser driver capability — the narrow interface the progression loop
//! drives, plus the concrete `eoka` adapter.

use crate::{BrowserConfig, Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A click/type target: either a CSS selector or visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Selector(String),
    Text(String),
}

impl Target {
    pub fn selector(s: impl Into<String>) -> Self {
        Target::Selector(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Target::Text(s.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Selector(s) => write!(f, "selector '{}'", s),
            Target::Text(t) => write!(f, "text '{}'", t),
        }
    }
}

/// An interactive element as seen by the snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct PageElement {
    /// HTML tag name (e.g. "button", "input", "a").
    pub tag: String,
    /// ARIA role if set.
    pub role: Option<String>,
    /// Visible text content, truncated.
    pub text: String,
    /// Placeholder attribute for inputs.
    pub placeholder: Option<String>,
    /// Input type (inputs only).
    pub input_type: Option<String>,
    /// CSS selector hint for this element.
    pub selector: String,
}

impl fmt::Display for PageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        if let Some(ref t) = self.input_type {
            if t != "text" {
                write!(f, " type=\"{}\"", t)?;
            }
        }
        f.write_str(">")?;
        if !self.text.is_empty() {
            write!(f, " \"{}\"", self.text)?;
        }
        if let Some(ref p) = self.placeholder {
            write!(f, " placeholder=\"{}\"", p)?;
        }
        if let Some(ref r) = self.role {
            let redundant = (r == "button" && self.tag == "button") || (r == "link" && self.tag == "a");
            if !redundant {
                write!(f, " role=\"{}\"", r)?;
            }
        }
        write!(f, " selector=\"{}\"", self.selector)
    }
}

/// The browser capability consumed by the progression loop.
///
/// Every call is bounded: implementations must surface failures as `false`
/// or a typed error, never an unbounded hang. The loop treats any `Err` as
/// a failure signal, so implementations are free to be strict.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Visible text content of the page.
    async fn visible_text(&self) -> Result<String>;

    /// Cheap serialized markup sample, used for settle detection.
    async fn markup(&self) -> Result<String>;

    /// Enumerate interactive elements currently on the page.
    async fn interactive_elements(&self) -> Result<Vec<PageElement>>;

    /// Click a target. `force` bypasses visibility/actionability checks.
    /// Returns false when no matching element was found or the click failed.
    async fn click(&self, target: &Target, timeout_ms: u64, force: bool) -> Result<bool>;

    /// Fill text into the element matching `selector`.
    async fn type_text(&self, selector: &str, text: &str) -> Result<bool>;

    /// Press a keyboard key (e.g. "Enter", "Tab").
    async fn press_key(&self, key: &str) -> Result<bool>;

    async fn scroll_by(&self, pixels: i64) -> Result<()>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Capture a PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

// =============================================================================
// eoka adapter
// =============================================================================

/// Find a clickable element by visible text — returns a CSS selector.
const FIND_BY_TEXT_JS: &str = r#"(() => {
    const text = arguments[0];
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, null);
    while (walker.nextNode()) {
        const el = walker.currentNode;
        if (el.textContent?.trim().toLowerCase().includes(text.toLowerCase())) {
            if (el.matches('a, button, input, select, [role="button"], [onclick]')) {
                if (el.id) return '#' + el.id;
                const path = [];
                let node = el;
                while (node && node !== document.body) {
                    let selector = node.tagName.toLowerCase();
                    if (node.id) {
                        path.unshift('#' + node.id);
                        break;
                    }
                    const siblings = Array.from(node.parentNode?.children || []);
                    const index = siblings.indexOf(node) + 1;
                    if (siblings.length > 1) selector += ':nth-child(' + index + ')';
                    path.unshift(selector);
                    node = node.parentNode;
                }
                return path.join(' > ');
            }
        }
    }
    return null;
})()"#;

/// Enumerate visible interactive elements with selector hints.
const ELEMENTS_JS: &str = r#"(() => {
    const INTERACTIVE = 'a, button, input, select, textarea, [role="button"], [role="link"], [onclick]';
    const results = [];
    const seen = new Set();

    for (const el of document.querySelectorAll(INTERACTIVE)) {
        const rect = el.getBoundingClientRect();
        if (rect.width < 2 || rect.height < 2) continue;
        const style = getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') continue;

        const tag = el.tagName.toLowerCase();
        let text = (el.getAttribute('aria-label') || el.textContent || '').trim().replace(/\s+/g, ' ');
        if (text.length > 60) text = text.substring(0, 57) + '...';
        const placeholder = el.getAttribute('placeholder') || '';
        const inputType = el.getAttribute('type') || '';

        let selector;
        if (el.id) {
            selector = '#' + CSS.escape(el.id);
        } else if (placeholder) {
            selector = tag + '[placeholder=' + JSON.stringify(placeholder) + ']';
        } else {
            const parts = [];
            let node = el;
            while (node && node !== document.body && parts.length < 4) {
                let s = node.tagName.toLowerCase();
                if (node.id) {
                    parts.unshift('#' + CSS.escape(node.id));
                    break;
                }
                const parent = node.parentElement;
                if (parent) {
                    const siblings = Array.from(parent.children).filter(c => c.tagName === node.tagName);
                    if (siblings.length > 1) s += ':nth-of-type(' + (siblings.indexOf(node) + 1) + ')';
                }
                parts.unshift(s);
                node = parent;
            }
            selector = parts.join(' > ');
        }

        if (seen.has(selector)) continue;
        seen.add(selector);

        results.push({
            tag,
            role: el.getAttribute('role') || null,
            text,
            placeholder: placeholder || null,
            input_type: tag === 'input' ? (inputType || 'text') : null,
            selector,
        });
    }
    return JSON.stringify(results);
})()"#;

/// Browser driver backed by [`eoka`].
pub struct EokaDriver {
    browser: eoka::Browser,
    page: eoka::Page,
}

impl EokaDriver {
    /// Launch a browser and open a blank page.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        };
        debug!("launching browser (headless: {})", config.headless);
        let browser = eoka::Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Self { browser, page })
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }

    async fn resolve(&self, target: &Target) -> Result<Option<String>> {
        match target {
            Target::Selector(s) => Ok(Some(s.clone())),
            Target::Text(t) => {
                let js = FIND_BY_TEXT_JS
                    .replace("arguments[0]", &serde_json::to_string(t).map_err(Error::Json)?);
                let found: Option<String> = self.page.evaluate(&js).await?;
                Ok(found)
            }
        }
    }
}

#[async_trait]
impl Driver for EokaDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn visible_text(&self) -> Result<String> {
        Ok(self.page.text().await?)
    }

    async fn markup(&self) -> Result<String> {
        Ok(self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await?)
    }

    async fn interactive_elements(&self) -> Result<Vec<PageElement>> {
        let json_str: String = self.page.evaluate(ELEMENTS_JS).await?;
        Ok(serde_json::from_str(&json_str)?)
    }

    async fn click(&self, target: &Target, timeout_ms: u64, force: bool) -> Result<bool> {
        let bounded = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            let Some(selector) = self.resolve(target).await? else {
                return Ok::<bool, Error>(false);
            };
            if force {
                // JS click bypasses actionability checks, so an animating or
                // half-obscured element cannot stall the caller.
                let js = format!(
                    "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
                    serde_json::to_string(&selector).map_err(Error::Json)?
                );
                Ok(self.page.evaluate(&js).await?)
            } else {
                Ok(self.page.try_click(&selector).await?)
            }
        })
        .await;
        match bounded {
            Ok(result) => result,
            Err(_) => {
                debug!("click on {} exceeded {}ms", target, timeout_ms);
                Ok(false)
            }
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<bool> {
        match self.page.fill(selector, text).await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("fill '{}' failed: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn press_key(&self, key: &str) -> Result<bool> {
        self.page.human().press_key(key).await?;
        Ok(true)
    }

    async fn scroll_by(&self, pixels: i64) -> Result<()> {
        self.page
            .execute(&format!("window.scrollBy(0, {pixels})"))
            .await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page
            .execute("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }
}
