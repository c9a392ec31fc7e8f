//! Run metrics — per-challenge progress and the serialized end-of-run
//! report.

use crate::Result;
use serde::Serialize;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::warn;

/// Live bookkeeping for one challenge.
///
/// At most one progress is open (no `completed_at`) at any time; the runner
/// seals the current one before opening the next.
#[derive(Debug, Clone)]
pub struct ChallengeProgress {
    pub ordinal: u32,
    pub actions_taken: u32,
    pub llm_calls: u32,
    pub consecutive_failures: u32,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
    pub success: bool,
    pub failure: Option<String>,
}

impl ChallengeProgress {
    fn new(ordinal: u32) -> Self {
        Self {
            ordinal,
            actions_taken: 0,
            llm_calls: 0,
            consecutive_failures: 0,
            started_at: Instant::now(),
            completed_at: None,
            success: false,
            failure: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at).as_millis() as u64
    }
}

/// Process-wide accumulator for one run. Mutated only by the runner;
/// flushed to a [`MetricsSink`] at run end or on abort.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    started_at: Instant,
    started_stamp: chrono::DateTime<chrono::Local>,
    finished_at: Option<Instant>,
    pub aborted: bool,
    pub abort_reason: Option<String>,
    pub challenges: Vec<ChallengeProgress>,
    pub total_llm_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            started_stamp: chrono::Local::now(),
            finished_at: None,
            aborted: false,
            abort_reason: None,
            challenges: Vec::new(),
            total_llm_calls: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
        }
    }

    /// Open a new challenge. If one is still open (which the runner never
    /// allows), it is sealed unsuccessful first so the one-open invariant
    /// holds.
    pub fn open_challenge(&mut self, ordinal: u32) -> &mut ChallengeProgress {
        if self.open().is_some() {
            warn!("opening challenge {} with another still open", ordinal);
            self.seal_open(false, Some("superseded".into()));
        }
        self.challenges.push(ChallengeProgress::new(ordinal));
        self.challenges.last_mut().unwrap()
    }

    /// The currently open challenge, if any.
    pub fn open(&self) -> Option<&ChallengeProgress> {
        self.challenges.last().filter(|c| c.is_open())
    }

    pub fn open_mut(&mut self) -> Option<&mut ChallengeProgress> {
        self.challenges.last_mut().filter(|c| c.is_open())
    }

    pub fn open_count(&self) -> usize {
        self.challenges.iter().filter(|c| c.is_open()).count()
    }

    /// Seal the open challenge with the outcome that actually happened.
    pub fn seal_open(&mut self, success: bool, failure: Option<String>) {
        if let Some(progress) = self.open_mut() {
            progress.completed_at = Some(Instant::now());
            progress.success = success;
            progress.failure = failure;
        }
    }

    pub fn add_usage(&mut self, llm_calls: u32, input_tokens: u64, output_tokens: u64) {
        self.total_llm_calls += llm_calls as u64;
        self.total_input_tokens += input_tokens;
        self.total_output_tokens += output_tokens;
    }

    /// Mark the run finished. Idempotent.
    pub fn finish(&mut self, aborted: bool, reason: Option<String>) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
            self.aborted = aborted;
            self.abort_reason = reason;
        }
    }

    pub fn total_duration_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at).as_millis() as u64
    }

    /// Serializable view of the run, always producible — incomplete
    /// challenges appear with explicit flags rather than being dropped.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_timestamp: self.started_stamp.to_rfc3339(),
            total_duration_ms: self.total_duration_ms(),
            challenges_attempted: self.challenges.len(),
            challenges_completed: self.challenges.iter().filter(|c| c.success).count(),
            aborted: self.aborted,
            abort_reason: self.abort_reason.clone(),
            llm: LlmUsageReport {
                total_calls: self.total_llm_calls,
                total_input_tokens: self.total_input_tokens,
                total_output_tokens: self.total_output_tokens,
            },
            challenges: self
                .challenges
                .iter()
                .map(|c| ChallengeReport {
                    challenge: c.ordinal,
                    duration_ms: c.duration_ms(),
                    actions_taken: c.actions_taken,
                    llm_calls: c.llm_calls,
                    success: c.success,
                    error: c.failure.clone(),
                })
                .collect(),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Final report written to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_timestamp: String,
    pub total_duration_ms: u64,
    pub challenges_attempted: usize,
    pub challenges_completed: usize,
    pub aborted: bool,
    pub abort_reason: Option<String>,
    pub llm: LlmUsageReport,
    pub challenges: Vec<ChallengeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmUsageReport {
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeReport {
    pub challenge: u32,
    pub duration_ms: u64,
    pub actions_taken: u32,
    pub llm_calls: u32,
    pub success: bool,
    pub error: Option<String>,
}

impl RunReport {
    /// Human-readable end-of-run summary.
    pub fn print_summary(&self) {
        println!();
        println!("{}", "=".repeat(60));
        println!("RUN SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Total Time:   {:.2}s", self.total_duration_ms as f64 / 1000.0);
        println!(
            "Challenges:   {}/{} completed",
            self.challenges_completed, self.challenges_attempted
        );
        match &self.abort_reason {
            Some(reason) if self.aborted => println!("Status:       ABORTED - {}", reason),
            _ => println!("Status:       FINISHED"),
        }
        println!(
            "LLM Usage:    {} calls, {} in / {} out tokens",
            self.llm.total_calls, self.llm.total_input_tokens, self.llm.total_output_tokens
        );
        println!("\nPer-Challenge Breakdown:");
        for c in &self.challenges {
            let status = if c.success { "✓" } else { "✗" };
            println!(
                "  {} Challenge {}: {}ms, {} actions, {} LLM calls",
                status, c.challenge, c.duration_ms, c.actions_taken, c.llm_calls
            );
        }
        println!("{}", "=".repeat(60));
    }
}

/// Write-only destination for the finalized report.
pub trait MetricsSink {
    fn record(&self, report: &RunReport) -> Result<()>;
}

/// Writes the report as pretty JSON to a file.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSink for JsonFileSink {
    fn record(&self, report: &RunReport) -> Result<()> {
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), report)?;
        Ok(())
    }
}
