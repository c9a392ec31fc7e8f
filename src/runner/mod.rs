//! Progression controller — the state machine binding snapshotting, popup
//! dismissal, detection, proposal, and execution under run-wide budgets.

mod executor;

use crate::config::{Budgets, Config};
use crate::detect::{self, ChallengeState};
use crate::driver::{Driver, Target};
use crate::llm::Completion;
use crate::metrics::{RunMetrics, RunReport};
use crate::popups;
use crate::proposal::ActionKind;
use crate::proposer;
use crate::snapshot::PageSnapshot;
use crate::stability;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Labels tried when a success signal suggests the page wants a click to
/// move on.
const ADVANCE_LABELS: &[&str] = &["Next", "Advance", "Continue", "Proceed", "Skip"];

/// Wider label set for `done` proposals — the page may phrase its advance
/// control any number of ways.
const DONE_LABELS: &[&str] = &[
    "Advance",
    "Next Section",
    "Move On",
    "Keep Going",
    "Proceed",
    "Next",
    "Continue",
    "Submit",
    "OK",
    "Go",
    "Forward",
];

/// Labels for the emergency skip after the failure budget is spent.
const EMERGENCY_LABELS: &[&str] = &["Next", "Advance", "Skip", "Continue", "Proceed"];

/// Entry controls on the landing page.
const START_LABELS: &[&str] = &["START", "Start", "Begin"];

const ADVANCE_CLICK_TIMEOUT_MS: u64 = 1000;
const ACTION_TIMEOUT_MS: u64 = 3000;
const STEP_PAUSE_MS: u64 = 300;
const TRANSITION_PAUSE_MS: u64 = 1000;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingChallenge,
    InChallenge,
    Advancing,
    Done,
    Aborted,
}

/// Drives the challenge-progression loop over a [`Driver`] and a
/// [`Completion`] client.
///
/// All run state lives here: no ambient globals. Collaborator failures are
/// converted to failure signals inside the loop; only the global deadline
/// ends the run early, and it does so through the `Aborted` state, never an
/// escaping error.
pub struct Runner<D, C> {
    driver: D,
    llm: C,
    config: Config,
    metrics: RunMetrics,
    phase: Phase,
    deadline: Instant,
    /// Textual-proposal failures on the current challenge; decays on
    /// success. Drives the vision escalation separately from the hard
    /// failure budget, so mixed success/failure streaks still escalate.
    text_failures: u32,
    vision_mode: bool,
}

impl<D: Driver, C: Completion> Runner<D, C> {
    pub fn new(driver: D, llm: C, config: Config) -> Self {
        let deadline = Instant::now() + Duration::from_secs(config.budgets.run_timeout_secs);
        Self {
            driver,
            llm,
            config,
            metrics: RunMetrics::new(),
            phase: Phase::AwaitingChallenge,
            deadline,
            text_failures: 0,
            vision_mode: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Hand the driver back, e.g. to close the browser.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Run the full challenge sequence. Always returns a report, including
    /// on abort.
    pub async fn run(&mut self) -> RunReport {
        let budgets = self.config.budgets.clone();
        self.metrics = RunMetrics::new();
        self.phase = Phase::AwaitingChallenge;
        self.text_failures = 0;
        self.vision_mode = false;
        self.deadline = Instant::now() + Duration::from_secs(budgets.run_timeout_secs);

        info!(
            "starting run against {} (timeout: {}s)",
            self.config.target.url, budgets.run_timeout_secs
        );

        if let Err(e) = self.driver.navigate(&self.config.target.url).await {
            self.abort(format!("navigation failed: {e}"));
            return self.metrics.report();
        }
        self.settle().await;

        // Clear the landing page before the loop: popups first, then the
        // start control if there is one.
        let dismissed = self.dismiss_popups().await;
        if dismissed > 0 {
            info!("dismissed {} initial popup(s)", dismissed);
        }
        if self.try_click_any(START_LABELS).await {
            info!("clicked start control");
        }

        loop {
            if Instant::now() >= self.deadline {
                self.abort("time limit exceeded");
                break;
            }

            self.settle().await;
            self.dismiss_popups().await;

            let snapshot = PageSnapshot::capture(&self.driver).await;
            if snapshot.unavailable {
                warn!("page unavailable, counting as a failure");
                self.record_failure();
                if self.check_escapes(&budgets).await {
                    if self.phase == Phase::Done {
                        break;
                    }
                    continue;
                }
                tokio::time::sleep(Duration::from_millis(STEP_PAUSE_MS)).await;
                continue;
            }

            let state = detect::detect_state(&snapshot);

            if state.all_complete {
                info!("all challenges completed");
                self.metrics.seal_open(true, None);
                self.phase = Phase::Done;
                break;
            }

            self.reconcile_ordinal(&state);

            if self.check_escapes(&budgets).await {
                if self.phase == Phase::Done {
                    break;
                }
                continue;
            }

            if state.success_detected && !state.error_detected {
                // Advance without spending an LLM call this iteration.
                if Instant::now() >= self.deadline {
                    self.abort("time limit exceeded");
                    break;
                }
                info!("success detected, trying advance controls");
                self.try_click_any(ADVANCE_LABELS).await;
                if let Some(open) = self.metrics.open_mut() {
                    open.actions_taken += 1;
                }
                tokio::time::sleep(Duration::from_millis(STEP_PAUSE_MS)).await;
                continue;
            }
            if state.is_ambiguous() {
                debug!("success and error markers both present, inconclusive");
            }

            let outcome = if self.vision_mode {
                if Instant::now() >= self.deadline {
                    self.abort("time limit exceeded");
                    break;
                }
                match self.driver.screenshot().await {
                    Ok(png) => {
                        proposer::propose_with_vision(&self.llm, &snapshot, &state, &png).await
                    }
                    Err(e) => {
                        warn!("screenshot failed: {}", e);
                        self.record_failure();
                        continue;
                    }
                }
            } else {
                proposer::propose_action(&self.llm, &snapshot, &state).await
            };

            self.metrics
                .add_usage(outcome.llm_calls, outcome.input_tokens, outcome.output_tokens);
            if let Some(open) = self.metrics.open_mut() {
                open.llm_calls += outcome.llm_calls;
            }

            match outcome.proposal {
                None => {
                    warn!("no proposal this iteration");
                    self.record_failure();
                }
                Some(proposal) if proposal.kind == ActionKind::Done => {
                    debug!("proposer says done: {}", proposal.rationale);
                    self.phase = Phase::Advancing;
                    self.try_click_any(DONE_LABELS).await;
                    if let Some(open) = self.metrics.open_mut() {
                        open.actions_taken += 1;
                    }
                }
                Some(proposal) => {
                    debug!(
                        "action: {:?} | {} | {}",
                        proposal.kind,
                        proposal.target.as_deref().unwrap_or(""),
                        proposal.rationale
                    );
                    let ok = executor::execute(&self.driver, &proposal, ACTION_TIMEOUT_MS).await;
                    if let Some(open) = self.metrics.open_mut() {
                        open.actions_taken += 1;
                    }
                    if ok {
                        self.record_success();
                    } else {
                        warn!("action failed");
                        self.record_failure();
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(STEP_PAUSE_MS)).await;
        }

        if self.phase == Phase::Done {
            self.metrics.finish(false, None);
        }
        self.metrics.report()
    }

    /// Fold the detected ordinal into the bookkeeping. Ordinals only move
    /// forward; a regression is logged and rejected.
    fn reconcile_ordinal(&mut self, state: &ChallengeState) {
        match (state.ordinal, self.metrics.open().map(|o| o.ordinal)) {
            (Some(n), None) => {
                info!("challenge {} started", n);
                self.open_challenge(n);
            }
            (Some(n), Some(o)) if n == o => {}
            (Some(n), Some(o)) if n > o => {
                info!("challenge {} completed, {} started", o, n);
                self.metrics.seal_open(true, None);
                self.phase = Phase::Advancing;
                self.open_challenge(n);
            }
            (Some(n), Some(o)) => {
                warn!("detected ordinal {} behind current {}, ignoring", n, o);
            }
            (None, Some(_)) => debug!("ordinal not detected this iteration"),
            (None, None) => debug!("challenge ordinal not detected yet"),
        }
    }

    fn open_challenge(&mut self, ordinal: u32) {
        self.metrics.open_challenge(ordinal);
        self.phase = Phase::InChallenge;
        self.text_failures = 0;
        self.vision_mode = false;
    }

    /// Per-challenge escape hatches. Returns true when a forced advance
    /// happened (the caller restarts the iteration). Also the point where
    /// the vision escalation engages.
    async fn check_escapes(&mut self, budgets: &Budgets) -> bool {
        let Some(open) = self.metrics.open() else {
            return false;
        };
        let (ordinal, actions, failures) = (open.ordinal, open.actions_taken, open.consecutive_failures);
        let elapsed = open.started_at.elapsed();

        if elapsed >= Duration::from_secs(budgets.challenge_timeout_secs) {
            warn!(
                "challenge {} exceeded its {}s ceiling, forcing advance",
                ordinal, budgets.challenge_timeout_secs
            );
            self.force_advance("challenge time ceiling exceeded", false, budgets)
                .await;
            return true;
        }
        if actions >= budgets.max_actions_per_challenge {
            warn!("max actions reached for challenge {}", ordinal);
            self.force_advance("max actions exceeded", false, budgets).await;
            return true;
        }
        if failures >= budgets.max_consecutive_failures {
            warn!("too many consecutive failures on challenge {}", ordinal);
            self.force_advance("max consecutive failures", true, budgets).await;
            return true;
        }

        if !self.vision_mode && self.text_failures >= budgets.vision_after_failures {
            info!("switching to vision proposals for challenge {}", ordinal);
            self.vision_mode = true;
        }
        false
    }

    /// Budget-exhaustion advance: seal the open challenge with the outcome
    /// that actually happened and move the expected ordinal forward. Runs
    /// exactly once per open challenge — the successor starts with fresh
    /// counters.
    async fn force_advance(&mut self, reason: &str, emergency_clicks: bool, budgets: &Budgets) {
        if emergency_clicks && Instant::now() < self.deadline {
            if self.try_click_any(EMERGENCY_LABELS).await {
                debug!("emergency advance control clicked");
            }
        }

        let next = self.metrics.open().map(|o| o.ordinal + 1).unwrap_or(1);
        self.metrics.seal_open(false, Some(reason.to_string()));
        self.text_failures = 0;
        self.vision_mode = false;

        if next > budgets.max_challenges {
            info!("forced past the final challenge, finishing");
            self.phase = Phase::Done;
            return;
        }

        self.phase = Phase::Advancing;
        self.open_challenge(next);
        tokio::time::sleep(Duration::from_millis(TRANSITION_PAUSE_MS)).await;
    }

    fn record_failure(&mut self) {
        self.text_failures += 1;
        if let Some(open) = self.metrics.open_mut() {
            open.consecutive_failures += 1;
        }
    }

    fn record_success(&mut self) {
        self.text_failures = self.text_failures.saturating_sub(1);
        if let Some(open) = self.metrics.open_mut() {
            open.consecutive_failures = 0;
        }
    }

    async fn settle(&self) {
        stability::wait_for_stable(
            &self.driver,
            self.config.stability.timeout_ms,
            self.config.stability.poll_interval_ms,
        )
        .await;
    }

    async fn dismiss_popups(&self) -> u32 {
        popups::dismiss_popups(
            &self.driver,
            self.config.popups.max_attempts,
            self.config.popups.settle_ms,
        )
        .await
    }

    /// Try each label with its own bounded click and settle; stop at the
    /// first that lands.
    async fn try_click_any(&self, labels: &[&str]) -> bool {
        for label in labels {
            match self
                .driver
                .click(&Target::text(*label), ADVANCE_CLICK_TIMEOUT_MS, false)
                .await
            {
                Ok(true) => {
                    debug!("clicked '{}'", label);
                    stability::wait_for_stable(
                        &self.driver,
                        500,
                        self.config.stability.poll_interval_ms,
                    )
                    .await;
                    return true;
                }
                Ok(false) => continue,
                Err(e) => {
                    debug!("advance click '{}' failed: {}", label, e);
                    continue;
                }
            }
        }
        false
    }

    fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("aborting run: {}", reason);
        self.metrics
            .seal_open(false, Some(format!("run aborted: {reason}")));
        self.phase = Phase::Aborted;
        self.metrics.finish(true, Some(reason));
    }
}
