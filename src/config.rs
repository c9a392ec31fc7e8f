//! Run configuration — YAML file with CLI-overridable fields.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level config structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of this challenge run.
    pub name: String,

    /// Browser configuration.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Target URL hosting the challenge sequence.
    pub target: TargetUrl,

    /// Budgets bounding the run and each challenge.
    #[serde(default)]
    pub budgets: Budgets,

    /// Page-settle polling parameters.
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Popup dismissal parameters.
    #[serde(default)]
    pub popups: PopupConfig,

    /// LLM client parameters.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Where the final JSON report is written.
    #[serde(default = "default_report_path")]
    pub report_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetUrl {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser headless.
    #[serde(default)]
    pub headless: bool,

    /// Optional proxy URL.
    pub proxy: Option<String>,

    /// Optional user agent override.
    pub user_agent: Option<String>,
}

/// Budgets for the progression loop.
///
/// The global deadline and the per-challenge ceiling are independent: the
/// first aborts the whole run, the second only forces a skip to the next
/// challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct Budgets {
    /// Wall-clock budget for the entire run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Wall-clock ceiling for a single challenge, in seconds.
    #[serde(default = "default_challenge_timeout")]
    pub challenge_timeout_secs: u64,

    /// Actions allowed on one challenge before a forced advance.
    #[serde(default = "default_max_actions")]
    pub max_actions_per_challenge: u32,

    /// Consecutive failed actions before a forced advance.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Consecutive failures before switching to vision proposals.
    #[serde(default = "default_vision_threshold")]
    pub vision_after_failures: u32,

    /// Highest challenge ordinal the run will attempt.
    #[serde(default = "default_max_challenges")]
    pub max_challenges: u32,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout(),
            challenge_timeout_secs: default_challenge_timeout(),
            max_actions_per_challenge: default_max_actions(),
            max_consecutive_failures: default_max_failures(),
            vision_after_failures: default_vision_threshold(),
            max_challenges: default_max_challenges(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    /// Overall budget for one settle wait, in milliseconds.
    #[serde(default = "default_stability_timeout")]
    pub timeout_ms: u64,

    /// Interval between content samples, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_stability_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopupConfig {
    /// Dismissal rounds per pass.
    #[serde(default = "default_popup_attempts")]
    pub max_attempts: u32,

    /// Settle delay after a successful dismissal click, in milliseconds.
    #[serde(default = "default_popup_settle")]
    pub settle_ms: u64,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_popup_attempts(),
            settle_ms: default_popup_settle(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout, in seconds.
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_report_path() -> String {
    "run_stats.json".into()
}
fn default_run_timeout() -> u64 {
    300
}
fn default_challenge_timeout() -> u64 {
    90
}
fn default_max_actions() -> u32 {
    8
}
fn default_max_failures() -> u32 {
    3
}
fn default_vision_threshold() -> u32 {
    3
}
fn default_max_challenges() -> u32 {
    30
}
fn default_stability_timeout() -> u64 {
    3000
}
fn default_poll_interval() -> u64 {
    200
}
fn default_popup_attempts() -> u32 {
    10
}
fn default_popup_settle() -> u64 {
    300
}
fn default_model() -> String {
    "claude-3-5-haiku-20241022".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout() -> u64 {
    60
}

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse config from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config.
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.target.url.is_empty() {
            return Err(Error::Config("target.url is required".into()));
        }
        if self.budgets.run_timeout_secs == 0 {
            return Err(Error::Config("budgets.run_timeout_secs must be at least 1".into()));
        }
        if self.budgets.max_actions_per_challenge == 0 {
            return Err(Error::Config(
                "budgets.max_actions_per_challenge must be at least 1".into(),
            ));
        }
        if self.budgets.max_consecutive_failures == 0 {
            return Err(Error::Config(
                "budgets.max_consecutive_failures must be at least 1".into(),
            ));
        }
        if self.stability.poll_interval_ms == 0 {
            return Err(Error::Config("stability.poll_interval_ms must be at least 1".into()));
        }
        Ok(())
    }
}
