//! CLI command definitions for formseed.
//!
//! Four pipeline commands (`up`, `generate`, `seed`, `down`) plus `status`.
//! Each command runs in its own process; `seed` and `status` attach to the
//! deployment started by an earlier `up`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SeederConfig;
use crate::generator::DataGenerator;
use crate::lifecycle::{ComposeRuntime, LifecycleController, LifecycleStatus};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::model::{GeneratedRecord, GenerationRequest};
use crate::platform::{HttpTransport, PlatformClient};
use crate::seeding::{SeedStore, Seeder};
use crate::validation::SchemaValidator;

/// Seed a local Formbricks instance with LLM-generated survey data.
#[derive(Parser)]
#[command(name = "formseed")]
#[command(about = "Generate synthetic survey data and seed it into a local Formbricks instance")]
#[command(version)]
#[command(
    long_about = "formseed brings up a local Formbricks instance, generates realistic surveys, questions and responses with an LLM, and seeds them through the management API in dependency order.\n\nSeeding progress is stored in a local SQLite file, so an interrupted or partially failed seed can simply be re-run.\n\nExample usage:\n  formseed up\n  formseed generate --surveys 5 --topic \"customer feedback\"\n  formseed seed\n  formseed down"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start the platform containers and wait until the platform is ready.
    Up(UpArgs),

    /// Generate survey data with the LLM and write it to a JSON file.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Seed generated data into the running platform.
    ///
    /// Entities already created by an earlier run are never submitted again,
    /// so this command is safe to re-run after failures or interruption.
    Seed(SeedArgs),

    /// Stop the platform containers.
    Down(DownArgs),

    /// Show the platform status and seeding progress.
    Status(StatusArgs),
}

/// Arguments for `formseed up`.
#[derive(Parser, Debug)]
pub struct UpArgs {
    /// Directory of the platform checkout (cloned when missing).
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Platform base URL used for the readiness probe.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Give up after this many seconds.
    #[arg(long)]
    pub max_wait_secs: Option<u64>,
}

/// Arguments for `formseed generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Number of surveys to generate.
    #[arg(long, default_value = "5")]
    pub surveys: usize,

    /// Questions per survey.
    #[arg(long, default_value = "4")]
    pub questions: usize,

    /// Responses per question.
    #[arg(long, default_value = "3")]
    pub responses: usize,

    /// Workspace members to generate.
    #[arg(long, default_value = "10")]
    pub members: usize,

    /// Topic hint; repeat or comma-separate for several.
    #[arg(short, long = "topic", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Output file for the generated data.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// LLM model to use for generation.
    #[arg(short, long)]
    pub model: Option<String>,

    /// OpenAI API key (can also be set via OPENAI_API_KEY env var).
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub llm_base_url: Option<String>,
}

/// Arguments for `formseed seed`.
#[derive(Parser, Debug)]
pub struct SeedArgs {
    /// Platform management API key (can also be set via FORMBRICKS_API_KEY env var).
    #[arg(long, env = "FORMBRICKS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Generated data file to seed.
    #[arg(short, long)]
    pub data_file: Option<PathBuf>,

    /// SQLite file holding seeding progress.
    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Maximum simultaneous creation requests.
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Platform base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Seed without checking that the platform is ready.
    #[arg(long)]
    pub skip_ready_check: bool,
}

/// Arguments for `formseed down`.
#[derive(Parser, Debug)]
pub struct DownArgs {
    /// Directory of the platform checkout.
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}

/// Arguments for `formseed status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// SQLite file holding seeding progress.
    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Platform base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Output JSON instead of text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = SeederConfig::from_env().context("Invalid FORMSEED_* configuration")?;

    match cli.command {
        Commands::Up(args) => run_up_command(args, config).await,
        Commands::Generate(args) => run_generate_command(args, config).await,
        Commands::Seed(args) => run_seed_command(args, config).await,
        Commands::Down(args) => run_down_command(args, config).await,
        Commands::Status(args) => run_status_command(args, config).await,
    }
}

// ============================================================================
// Lifecycle commands
// ============================================================================

fn build_controller(config: &SeederConfig) -> anyhow::Result<LifecycleController> {
    let runtime = ComposeRuntime::new(&config.lifecycle)?;
    Ok(LifecycleController::new(
        Arc::new(runtime),
        config.lifecycle.clone(),
        &config.platform.base_url,
    ))
}

async fn run_up_command(args: UpArgs, mut config: SeederConfig) -> anyhow::Result<()> {
    if let Some(dir) = args.project_dir {
        config.lifecycle.project_dir = dir;
    }
    if let Some(url) = args.base_url {
        config.platform.base_url = url;
    }
    if let Some(secs) = args.max_wait_secs {
        config.lifecycle.max_wait = std::time::Duration::from_secs(secs);
    }
    config.validate()?;

    let controller = build_controller(&config)?;
    controller.attach().await?;

    info!(
        project_dir = %config.lifecycle.project_dir.display(),
        health_url = controller.health_url(),
        "Bringing platform up"
    );
    controller.up().await.context("Platform failed to start")?;

    println!("Platform is ready at {}", config.platform.base_url);
    Ok(())
}

async fn run_down_command(args: DownArgs, mut config: SeederConfig) -> anyhow::Result<()> {
    if let Some(dir) = args.project_dir {
        config.lifecycle.project_dir = dir;
    }

    let controller = build_controller(&config)?;
    controller.attach().await?;

    match controller.down().await {
        Ok(()) => println!("Platform is down"),
        // Teardown problems are reported but do not fail the command.
        Err(e) => {
            warn!(error = %e, "Teardown did not complete");
            eprintln!("Warning: {e}");
        }
    }
    Ok(())
}

// ============================================================================
// Generate command
// ============================================================================

fn build_llm_client(
    api_key: Option<String>,
    base_url: Option<String>,
    model: &str,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let key = api_key
        .filter(|k| !k.trim().is_empty())
        .context("No LLM API key. Please provide --api-key or set OPENAI_API_KEY.")?;

    let provider = match base_url {
        Some(url) => OpenAiProvider::with_custom_url(key, url, model.to_string())?,
        None => OpenAiProvider::with_model(key, model.to_string())?,
    };
    info!(model, base_url = provider.base_url(), "Using OpenAI-compatible provider");
    Ok(Arc::new(provider))
}

async fn run_generate_command(args: GenerateArgs, mut config: SeederConfig) -> anyhow::Result<()> {
    if let Some(model) = args.model {
        config.generator.model = model;
    }
    let output = args.output.unwrap_or(config.seed.data_file.clone());

    let request = GenerationRequest {
        surveys: args.surveys,
        questions_per_survey: args.questions,
        responses_per_question: args.responses,
        members: args.members,
        topics: if args.topics.is_empty() {
            GenerationRequest::default().topics
        } else {
            args.topics
        },
    };

    let llm = build_llm_client(args.api_key, args.llm_base_url, &config.generator.model)?;
    let generator = DataGenerator::new(llm, config.generator.clone());

    info!(
        surveys = request.surveys,
        questions = request.questions_per_survey,
        responses = request.responses_per_question,
        "Generating survey data"
    );
    let record = generator.generate(&request).await?;

    let report = SchemaValidator::validate(&record);
    for warning in &report.warnings {
        warn!(warning = %warning, "Generated data warning");
    }
    if !report.valid {
        for error in &report.errors {
            warn!(violation = %error, "Generated data violation");
        }
        warn!(
            violations = report.errors.len(),
            "Generated data has structural problems; `seed` will refuse it until fixed"
        );
    }

    write_record(&output, &record)?;
    println!(
        "Generated {} entities ({} surveys, {} members) into {}",
        record.entity_count(),
        record.workspace.surveys.len(),
        record.workspace.members.len(),
        output.display()
    );
    Ok(())
}

fn write_record(path: &Path, record: &GeneratedRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_record(path: &Path) -> anyhow::Result<GeneratedRecord> {
    if !path.exists() {
        bail!(
            "Generated data file {} not found; run `formseed generate` first",
            path.display()
        );
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

// ============================================================================
// Seed and status commands
// ============================================================================

async fn run_seed_command(args: SeedArgs, mut config: SeederConfig) -> anyhow::Result<()> {
    if let Some(path) = args.data_file {
        config.seed.data_file = path;
    }
    if let Some(path) = args.state_db {
        config.seed.state_db = path;
    }
    if let Some(n) = args.concurrency {
        config.seed.concurrency = n;
    }
    if let Some(url) = args.base_url {
        config.platform.base_url = url;
    }
    config.validate()?;

    let api_key = args
        .api_key
        .filter(|k| !k.trim().is_empty())
        .context("No platform API key. Please provide --api-key or set FORMBRICKS_API_KEY.")?;

    let record = read_record(&config.seed.data_file)?;

    if !args.skip_ready_check {
        ensure_ready(&config).await?;
    }

    let transport = HttpTransport::new(&config.platform, api_key)?;
    let client = Arc::new(PlatformClient::new(Arc::new(transport), config.retry.clone()));
    let store = SeedStore::open(&config.seed.state_db).await?;
    let seeder = Seeder::new(client, store, config.seed.concurrency);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight requests");
            on_signal.cancel();
        }
    });

    let summary = seeder.seed_record(&record, &cancel).await?;
    seeder.store().close().await;

    println!("{summary}");
    if summary.unresolved > 0 {
        bail!(
            "{} entities were accepted by the platform without a readable id and will not be \
             resubmitted; check them on the platform and reconcile {}",
            summary.unresolved,
            config.seed.state_db.display()
        );
    }
    if !summary.is_complete() {
        bail!(
            "Seeding incomplete ({} of {} entities present); re-run `formseed seed` to continue",
            summary.created + summary.already_created,
            summary.total
        );
    }
    Ok(())
}

/// Refuse to seed unless the platform is ready; wait when it is starting.
async fn ensure_ready(config: &SeederConfig) -> anyhow::Result<()> {
    let controller = build_controller(config)?;
    match controller.attach().await? {
        LifecycleStatus::Ready => Ok(()),
        LifecycleStatus::Starting => {
            info!("Platform is starting, waiting for readiness");
            controller.await_ready().await?;
            Ok(())
        }
        status => bail!("Platform is {status}; run `formseed up` first"),
    }
}

async fn run_status_command(args: StatusArgs, mut config: SeederConfig) -> anyhow::Result<()> {
    if let Some(path) = args.state_db {
        config.seed.state_db = path;
    }
    if let Some(url) = args.base_url {
        config.platform.base_url = url;
    }

    let controller = build_controller(&config)?;
    let status = controller.attach().await?;

    let counts = if config.seed.state_db.exists() {
        let store = SeedStore::open(&config.seed.state_db).await?;
        let counts = store.counts().await?;
        store.close().await;
        Some(counts)
    } else {
        None
    };

    if args.json {
        let seeding = counts.map(|c| {
            serde_json::json!({
                "pending": c.pending,
                "in_flight": c.in_flight,
                "created": c.created,
                "failed": c.failed,
                "unresolved": c.unresolved,
                "total": c.total(),
            })
        });
        let out = serde_json::json!({ "platform": status.as_str(), "seeding": seeding });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("platform: {status}");
    match counts {
        Some(c) => println!(
            "seeding: {} created, {} failed, {} unresolved, {} pending, {} in flight ({} total)",
            c.created,
            c.failed,
            c.unresolved,
            c.pending,
            c.in_flight,
            c.total()
        ),
        None => println!("seeding: no state at {}", config.seed.state_db.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample_record;

    #[test]
    fn test_parse_generate_args() {
        let cli = Cli::try_parse_from([
            "formseed",
            "generate",
            "--surveys",
            "2",
            "--topic",
            "hiring,onboarding",
            "--topic",
            "churn",
            "--api-key",
            "sk-test",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.surveys, 2);
                assert_eq!(args.questions, 4);
                assert_eq!(args.topics, vec!["hiring", "onboarding", "churn"]);
                assert_eq!(args.api_key.as_deref(), Some("sk-test"));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["formseed", "seed", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Seed(_)));
    }

    #[test]
    fn test_record_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("data.json");
        let record = sample_record();

        write_record(&path, &record).unwrap();
        assert_eq!(read_record(&path).unwrap(), record);
    }

    #[test]
    fn test_missing_data_file_points_to_generate() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_record(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("formseed generate"));
    }

    #[test]
    fn test_llm_client_requires_key() {
        assert!(build_llm_client(None, None, "gpt-4").is_err());
        assert!(build_llm_client(Some("sk-test".to_string()), None, "gpt-4").is_ok());
    }
}
