use anyhow::Context;
use clap::Parser;
use gauntlet::{AnthropicClient, Config, EokaDriver, JsonFileSink, MetricsSink, Phase, Runner};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gauntlet")]
#[command(about = "LLM-driven browser challenge runner")]
#[command(version)]
struct Cli {
    /// Config file to run
    config: PathBuf,

    /// Run the browser headless (overrides config)
    #[arg(long)]
    headless: bool,

    /// Target URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Global run timeout in seconds (overrides config)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Report output path (overrides config)
    #[arg(long)]
    report: Option<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(url) = cli.url {
        config.target.url = url;
    }
    if let Some(secs) = cli.timeout_secs {
        config.budgets.run_timeout_secs = secs;
    }
    if let Some(path) = cli.report {
        config.report_path = path;
    }

    if cli.check {
        println!("Config valid: {}", config.name);
        println!("  Target: {}", config.target.url);
        println!(
            "  Budgets: {}s run, {}s/challenge, {} actions, {} failures",
            config.budgets.run_timeout_secs,
            config.budgets.challenge_timeout_secs,
            config.budgets.max_actions_per_challenge,
            config.budgets.max_consecutive_failures,
        );
        println!("  Model: {}", config.llm.model);
        return Ok(());
    }

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .context("ANTHROPIC_API_KEY not set in environment")?;

    println!("Running: {}", config.name);

    let driver = EokaDriver::launch(&config.browser).await?;
    let llm = AnthropicClient::new(api_key, &config.llm);
    let report_path = config.report_path.clone();

    let mut runner = Runner::new(driver, llm, config);
    let report = runner.run().await;
    let aborted = runner.phase() == Phase::Aborted;

    runner.into_driver().close().await?;

    JsonFileSink::new(&report_path)
        .record(&report)
        .with_context(|| format!("failed to write report to {report_path}"))?;
    report.print_summary();
    println!("Report written to {report_path}");

    if aborted {
        std::process::exit(1);
    }

    Ok(())
}
