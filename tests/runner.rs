//! Controller tests against a scripted fake site and LLM.
//!
//! Everything runs under tokio's paused clock, so waits and budgets elapse
//! in virtual time and the suite stays fast.

use async_trait::async_trait;
use gauntlet::{
    Completion, CompletionResponse, Config, Driver, PageElement, Phase, Runner, Target,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Fakes
// =============================================================================

/// A scripted challenge site. The page advances when the "Submit" control is
/// clicked; everything else is inert unless listed in `clickable_selectors`.
struct FakeSite {
    pages: Vec<String>,
    idx: AtomicUsize,
    ops: Mutex<Vec<String>>,
    typed: Mutex<Option<String>>,
    clickable_selectors: Vec<String>,
    advance_on_submit: bool,
    /// Visible-text labels that advance the page when clicked.
    advance_labels: Vec<String>,
    markup_delay_ms: u64,
    fail_navigation: bool,
}

impl FakeSite {
    fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            idx: AtomicUsize::new(0),
            ops: Mutex::new(Vec::new()),
            typed: Mutex::new(None),
            clickable_selectors: Vec::new(),
            advance_on_submit: false,
            advance_labels: Vec::new(),
            markup_delay_ms: 0,
            fail_navigation: false,
        }
    }

    fn page(&self) -> &str {
        &self.pages[self.idx.load(Ordering::SeqCst).min(self.pages.len() - 1)]
    }

    fn advance(&self) {
        let cur = self.idx.load(Ordering::SeqCst);
        if cur + 1 < self.pages.len() {
            self.idx.store(cur + 1, Ordering::SeqCst);
        }
    }

    fn push(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for FakeSite {
    async fn navigate(&self, url: &str) -> gauntlet::Result<()> {
        if self.fail_navigation {
            return Err(gauntlet::Error::DriverTimeout("net::ERR_FAILED".into()));
        }
        self.push(format!("navigate {url}"));
        Ok(())
    }

    async fn visible_text(&self) -> gauntlet::Result<String> {
        Ok(self.page().to_string())
    }

    async fn markup(&self) -> gauntlet::Result<String> {
        if self.markup_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.markup_delay_ms)).await;
        }
        Ok(format!("<html>{}</html>", self.page()))
    }

    async fn interactive_elements(&self) -> gauntlet::Result<Vec<PageElement>> {
        Ok(vec![
            PageElement {
                tag: "input".into(),
                role: None,
                text: String::new(),
                placeholder: Some("Enter code".into()),
                input_type: Some("text".into()),
                selector: "input[placeholder=\"Enter code\"]".into(),
            },
            PageElement {
                tag: "button".into(),
                role: None,
                text: "Submit".into(),
                placeholder: None,
                input_type: None,
                selector: "button:nth-of-type(1)".into(),
            },
        ])
    }

    async fn click(&self, target: &Target, _timeout_ms: u64, _force: bool) -> gauntlet::Result<bool> {
        self.push(format!("click {target}"));
        match target {
            Target::Text(t) if t == "Submit" && self.advance_on_submit => {
                self.advance();
                Ok(true)
            }
            Target::Text(t) if self.advance_labels.iter().any(|l| l == t) => {
                self.advance();
                Ok(true)
            }
            Target::Selector(s) if self.clickable_selectors.iter().any(|c| c == s) => Ok(true),
            _ => Ok(false),
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> gauntlet::Result<bool> {
        self.push(format!("type {selector} = {text}"));
        *self.typed.lock().unwrap() = Some(text.to_string());
        Ok(true)
    }

    async fn press_key(&self, key: &str) -> gauntlet::Result<bool> {
        self.push(format!("press {key}"));
        Ok(true)
    }

    async fn scroll_by(&self, pixels: i64) -> gauntlet::Result<()> {
        self.push(format!("scroll_by {pixels}"));
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> gauntlet::Result<()> {
        self.push("scroll_to_bottom".into());
        Ok(())
    }

    async fn screenshot(&self) -> gauntlet::Result<Vec<u8>> {
        self.push("screenshot".into());
        Ok(vec![0u8; 8])
    }
}

/// Scripted LLM: pops queued responses, then falls back to `default` (or a
/// transport error when there is none).
struct ScriptedLlm {
    queue: Mutex<VecDeque<String>>,
    default: Option<String>,
    text_calls: AtomicUsize,
    vision_calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Self {
        Self {
            queue: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            default: None,
            text_calls: AtomicUsize::new(0),
            vision_calls: AtomicUsize::new(0),
        }
    }

    fn with_default(default: &str) -> Self {
        let mut llm = Self::new(&[]);
        llm.default = Some(default.to_string());
        llm
    }

    fn next(&self) -> gauntlet::Result<CompletionResponse> {
        let text = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.default.clone())
            .ok_or(gauntlet::Error::LlmApi {
                status: 529,
                message: "overloaded".into(),
            })?;
        Ok(CompletionResponse {
            text,
            input_tokens: 100,
            output_tokens: 25,
        })
    }
}

#[async_trait]
impl Completion for ScriptedLlm {
    async fn complete(&self, _system: &str, _user: &str) -> gauntlet::Result<CompletionResponse> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    async fn complete_with_image(
        &self,
        _system: &str,
        _user: &str,
        _image: &[u8],
    ) -> gauntlet::Result<CompletionResponse> {
        self.vision_calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }
}

fn config(max_challenges: u32) -> Config {
    Config::parse(&format!(
        r#"
name: "test"
target:
  url: "https://challenge.test"
budgets:
  run_timeout_secs: 300
  challenge_timeout_secs: 90
  max_actions_per_challenge: 8
  max_consecutive_failures: 3
  vision_after_failures: 3
  max_challenges: {max_challenges}
stability:
  timeout_ms: 1000
  poll_interval_ms: 200
"#
    ))
    .unwrap()
}

// =============================================================================
// End-to-end progression
// =============================================================================

#[tokio::test(start_paused = true)]
async fn solves_hidden_code_challenge_and_advances() {
    let site = FakeSite {
        advance_on_submit: true,
        ..FakeSite::new(&[
            "Step 1 of 30 — Hidden Code. data-challenge-code=\"4821\"",
            "Step 2 of 30 — Something harder",
        ])
    };
    let llm = ScriptedLlm::new(&[
        r#"{"action": "type", "selector": "input[placeholder=\"Enter code\"]", "value": "4821", "multi_step": true}"#,
        r#"{"action": "submit"}"#,
    ]);

    let mut runner = Runner::new(site, llm, config(2));
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Done);
    assert_eq!(runner.metrics().open_count(), 0);

    // Challenge 1: typed the code, submitted, sealed successful when the
    // detected ordinal moved to 2.
    let first = &report.challenges[0];
    assert_eq!(first.challenge, 1);
    assert!(first.success);
    assert_eq!(first.actions_taken, 2);
    assert_eq!(first.llm_calls, 2);

    // The next iteration detected ordinal 2 and opened a new challenge.
    assert_eq!(report.challenges[1].challenge, 2);

    let site = runner.into_driver();
    assert!(site.ops().iter().any(|op| op.contains("type") && op.contains("4821")));
    assert_eq!(*site.typed.lock().unwrap(), Some("4821".into()));
}

#[tokio::test(start_paused = true)]
async fn completion_screen_finishes_the_run() {
    let site = FakeSite {
        advance_on_submit: true,
        ..FakeSite::new(&[
            "Step 1 of 30 — final task",
            "Congratulations! You finished all 30 challenges.",
        ])
    };
    let llm = ScriptedLlm::new(&[r#"{"action": "submit"}"#]);

    let mut runner = Runner::new(site, llm, config(30));
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Done);
    assert!(!report.aborted);
    assert_eq!(report.challenges_completed, 1);
    assert!(report.challenges[0].success);
}

#[tokio::test(start_paused = true)]
async fn success_signal_advances_without_an_llm_call() {
    let site = FakeSite {
        advance_labels: vec!["Next".into()],
        ..FakeSite::new(&[
            "Step 1 of 30 — Correct! Well done.",
            "Step 2 of 30 — next puzzle",
        ])
    };
    // Queue is empty: any LLM call on challenge 1 would error and show up
    // as a failure there.
    let llm = ScriptedLlm::new(&[]);

    let mut runner = Runner::new(site, llm, config(2));
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Done);
    let first = &report.challenges[0];
    assert_eq!(first.challenge, 1);
    assert!(first.success);
    assert_eq!(first.llm_calls, 0);
    assert_eq!(first.actions_taken, 1);
}

// =============================================================================
// Budget escape hatches
// =============================================================================

#[tokio::test(start_paused = true)]
async fn action_budget_forces_exactly_one_advance() {
    let site = FakeSite {
        clickable_selectors: vec!["#noop".into()],
        ..FakeSite::new(&["Step 1 of 30 — unsolvable puzzle"])
    };
    // Every proposal lands, but the page never changes.
    let llm = ScriptedLlm::with_default(r##"{"action": "click", "selector": "#noop"}"##);

    let mut runner = Runner::new(site, llm, config(1));
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Done);
    // Exactly one seal: no double-seal, no repeated forced advance.
    assert_eq!(report.challenges.len(), 1);
    let first = &report.challenges[0];
    assert_eq!(first.actions_taken, 8);
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("max actions exceeded"));
    assert_eq!(runner.metrics().open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failure_budget_tries_emergency_clicks_then_advances() {
    // Nothing is clickable: every executed action fails.
    let site = FakeSite::new(&["Step 1 of 30 — broken page"]);
    let llm = ScriptedLlm::with_default(r##"{"action": "click", "selector": "#missing"}"##);

    let mut runner = Runner::new(site, llm, config(1));
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Done);
    assert_eq!(report.challenges.len(), 1);
    let first = &report.challenges[0];
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("max consecutive failures"));
    assert_eq!(first.actions_taken, 3);

    let site = runner.into_driver();
    assert!(
        site.ops().iter().any(|op| op == "click text 'Next'"),
        "emergency advance controls should have been tried"
    );
}

#[tokio::test(start_paused = true)]
async fn challenge_ceiling_forces_advance_independently_of_deadline() {
    let site = FakeSite::new(&["Step 1 of 30 — slow burner"]);
    // `wait` always succeeds, so neither the action-failure budget nor the
    // action count (capped high here) fires before the time ceiling.
    let llm = ScriptedLlm::with_default(r#"{"action": "wait"}"#);

    let mut cfg = config(1);
    cfg.budgets.challenge_timeout_secs = 10;
    cfg.budgets.max_actions_per_challenge = 1000;
    cfg.budgets.max_consecutive_failures = 1000;

    let mut runner = Runner::new(site, llm, cfg);
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Done);
    assert!(!report.aborted);
    assert_eq!(
        report.challenges[0].error.as_deref(),
        Some("challenge time ceiling exceeded")
    );
}

// =============================================================================
// Vision escalation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn vision_mode_engages_after_textual_failures() {
    let site = FakeSite::new(&["Step 1 of 30 — visual puzzle"]);
    let llm = ScriptedLlm::with_default(r##"{"action": "click", "selector": "#missing"}"##);

    let mut cfg = config(1);
    cfg.budgets.vision_after_failures = 2;
    cfg.budgets.max_consecutive_failures = 3;

    let mut runner = Runner::new(site, llm, cfg);
    runner.run().await;

    // The third proposal round ran in vision mode (two failures had
    // accumulated by then).
    assert!(runner.metrics().total_llm_calls >= 3);

    let site = runner.into_driver();
    assert!(
        site.ops().iter().any(|op| op == "screenshot"),
        "vision mode should capture a screenshot"
    );
}

// =============================================================================
// Global deadline
// =============================================================================

#[tokio::test(start_paused = true)]
async fn deadline_aborts_within_one_iteration_of_overrun() {
    // Each markup sample would hang for 10s — far beyond the stability
    // wait's nominal budget — simulating a misconfigured inner timeout. The
    // run must still abort within deadline + one iteration.
    let site = FakeSite {
        markup_delay_ms: 10_000,
        ..FakeSite::new(&["loading, please hold"])
    };
    let llm = ScriptedLlm::new(&[]); // every call errors

    let mut cfg = config(30);
    cfg.budgets.run_timeout_secs = 5;
    cfg.stability.timeout_ms = 500;

    let start = Instant::now();
    let mut runner = Runner::new(site, llm, cfg);
    let report = runner.run().await;
    let elapsed = start.elapsed();

    assert_eq!(runner.phase(), Phase::Aborted);
    assert!(report.aborted);
    assert_eq!(report.abort_reason.as_deref(), Some("time limit exceeded"));
    assert!(
        elapsed <= Duration::from_secs(6),
        "run overshot its deadline: {:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn abort_seals_the_open_challenge() {
    let site = FakeSite::new(&["Step 1 of 30 — endless"]);
    let llm = ScriptedLlm::with_default(r#"{"action": "wait"}"#);

    let mut cfg = config(30);
    cfg.budgets.run_timeout_secs = 5;
    cfg.budgets.challenge_timeout_secs = 1000;
    cfg.budgets.max_actions_per_challenge = 1000;
    cfg.budgets.max_consecutive_failures = 1000;

    let mut runner = Runner::new(site, llm, cfg);
    let report = runner.run().await;

    assert!(report.aborted);
    assert_eq!(runner.metrics().open_count(), 0);
    assert_eq!(report.challenges.len(), 1);
    let first = &report.challenges[0];
    assert!(!first.success);
    assert!(first.error.as_deref().unwrap().contains("aborted"));
}

#[tokio::test(start_paused = true)]
async fn navigation_failure_aborts_with_report() {
    let site = FakeSite {
        fail_navigation: true,
        ..FakeSite::new(&["never seen"])
    };
    let llm = ScriptedLlm::new(&[]);

    let mut runner = Runner::new(site, llm, config(30));
    let report = runner.run().await;

    assert_eq!(runner.phase(), Phase::Aborted);
    assert!(report.aborted);
    assert!(report.abort_reason.unwrap().contains("navigation failed"));
    assert!(report.challenges.is_empty());
}
