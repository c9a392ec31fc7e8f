//! # gauntlet
//!
//! LLM-driven browser automation for multi-step web challenge gauntlets.
//!
//! A [`Runner`] drives a browser through a sequence of unknown challenges:
//! each loop iteration waits for the page to settle, clears popups, snapshots
//! the page, detects the current challenge, and asks an LLM for the next UI
//! action. Budgets on actions, failures, and wall-clock time keep a single
//! stubborn challenge from eating the whole run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gauntlet::{AnthropicClient, Config, EokaDriver, Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> gauntlet::Result<()> {
//! let config = Config::load("configs/challenge.yaml")?;
//! let driver = EokaDriver::launch(&config.browser).await?;
//! let llm = AnthropicClient::new("sk-...", &config.llm);
//! let mut runner = Runner::new(driver, llm, config);
//! let report = runner.run().await;
//! println!("completed {}/{}", report.challenges_completed, report.challenges_attempted);
//! # Ok(())
//! # }
//! ```

mod config;
pub mod detect;
pub mod driver;
pub mod llm;
pub mod metrics;
pub mod popups;
pub mod proposal;
pub mod proposer;
mod runner;
pub mod snapshot;
pub mod stability;

pub use config::{BrowserConfig, Budgets, Config, LlmConfig, PopupConfig, StabilityConfig, TargetUrl};
pub use driver::{Driver, EokaDriver, PageElement, Target};
pub use llm::{AnthropicClient, Completion, CompletionResponse};
pub use metrics::{ChallengeProgress, JsonFileSink, MetricsSink, RunMetrics, RunReport};
pub use proposal::{ActionKind, ActionProposal};
pub use runner::{Phase, Runner};
pub use snapshot::PageSnapshot;

/// Result type for gauntlet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or a challenge run.
///
/// Inside the progression loop nothing propagates: the runner converts
/// collaborator errors into failure signals and keeps going. These surface
/// only from setup (config, browser launch) and the report sink.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("llm transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("llm api error ({status}): {message}")]
    LlmApi { status: u16, message: String },

    #[error("proposal parse error: {0}")]
    ProposalParse(String),

    #[error("driver timeout: {0}")]
    DriverTimeout(String),
}
