use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use readme_review::agent::claude::ClaudeClient;
use readme_review::agent::template::TemplateGenerator;
use readme_review::agent::TextGenerator;
use readme_review::analysis::keywords::FrequencyExtractor;
use readme_review::config::{AppConfig, LoggingConfig};
use readme_review::console::ConsoleInput;
use readme_review::error::AppError;
use readme_review::exit_codes;
use readme_review::platform::github::GitHubFetcher;
use readme_review::storage::FileReportSink;
use readme_review::workflow::checkpoint::CheckpointMode;
use readme_review::workflow::stages::StageLimits;
use readme_review::workflow::state::Status;
use readme_review::workflow::Orchestrator;

#[derive(Parser)]
#[command(
    name = "readme-review",
    about = "Review a GitHub repository README with human checkpoints"
)]
struct Cli {
    /// Repository to review (`owner/repo` or a GitHub URL)
    #[arg(short, long)]
    repo: String,

    /// Substitute the configured default decision at every checkpoint
    #[arg(long)]
    no_interactive: bool,

    /// Free-form feedback appended to the final report
    #[arg(long)]
    human_feedback: Option<String>,

    /// Language model used for generation
    #[arg(long)]
    model: Option<String>,

    /// Timeout in seconds for GitHub and model requests
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory for reports and recommendations
    #[arg(long)]
    output_dir: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            match e.downcast_ref::<AppError>() {
                Some(AppError::Validation(_)) => exit_codes::INVALID_REFERENCE,
                _ => exit_codes::STARTUP,
            }
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    let _log_guard = init_tracing(&config.logging);

    tracing::info!(
        repo = %cli.repo,
        interactive = config.pipeline.interactive,
        model = %config.llm.model,
        "Starting readme-review"
    );

    let orchestrator = build(&config, cli.human_feedback)?;
    let outcome = orchestrator.run(&cli.repo).await?;

    match (outcome.state.status(), outcome.state.final_report()) {
        (Status::Complete, Some(report)) => println!("{report}"),
        (status, _) => println!("Review ended with status {status}; no report was produced."),
    }
    if let Some(location) = &outcome.location {
        println!("\nSaved to {location}");
    }
    if let Some(error) = &outcome.storage_error {
        eprintln!("warning: result was not saved: {error}");
    }

    Ok(outcome.exit_code())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if cli.no_interactive {
        config.pipeline.interactive = false;
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.llm.timeout_secs = timeout;
        config.github.timeout_secs = timeout;
    }
    if let Some(dir) = &cli.output_dir {
        config.pipeline.output_dir = dir.into();
    }
    if cli.log_json {
        config.logging.json = true;
    }
}

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut guard = None;
    let file_layer = if logging.file {
        match std::fs::create_dir_all(&logging.dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(&logging.dir, "app.log");
                let (writer, worker) = tracing_appender::non_blocking(appender);
                guard = Some(worker);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
            }
            Err(e) => {
                eprintln!(
                    "warning: cannot create log directory {}: {e}",
                    logging.dir.display()
                );
                None
            }
        }
    } else {
        None
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    guard
}

fn build(config: &AppConfig, human_feedback: Option<String>) -> anyhow::Result<Orchestrator> {
    let fetcher = Arc::new(GitHubFetcher::new(&config.github)?);
    let extractor = Arc::new(FrequencyExtractor::new(config.pipeline.top_keywords));

    let generator: Arc<dyn TextGenerator> = match config.llm_api_key() {
        Some(key) => Arc::new(ClaudeClient::new(
            key,
            &config.llm.model,
            config.llm.max_tokens,
            Duration::from_secs(config.llm.timeout_secs),
        )),
        None => {
            tracing::warn!("No LLM API key configured, using the offline template generator");
            Arc::new(TemplateGenerator)
        }
    };

    let sink = Arc::new(FileReportSink::new(config.pipeline.output_dir.clone()));

    let mode = if config.pipeline.interactive {
        CheckpointMode::Interactive(Arc::new(ConsoleInput))
    } else {
        CheckpointMode::NonInteractive {
            default: config.pipeline.default_decision()?,
        }
    };

    Ok(Orchestrator::new(fetcher, extractor, generator, sink, mode)
        .with_retry(config.retry.policy())
        .with_limits(StageLimits {
            max_readme_chars: config.pipeline.max_readme_chars,
            max_tags: config.pipeline.max_tags,
        })
        .with_max_edit_attempts(config.pipeline.max_edit_attempts)
        .with_human_feedback(human_feedback))
}
