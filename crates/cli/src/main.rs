//! Mealwise CLI entry point.
//!
//! This binary is the composition root for the entire system. It:
//!
//! 1. Loads configuration (`mealwise.toml` plus `MEALWISE__*` overrides).
//! 2. Installs the tracing subscriber (JSON to stderr, optional OTLP export).
//! 3. Builds the provider registry and orchestrator from configuration.
//! 4. Runs one command and prints its result as JSON on stdout.
//!
//! Ctrl-C cancels the in-flight run; the partial run reports `cancelled`.

mod config;
mod observability;
mod providers;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use generation::{
    EncodedImage, GenerationRequest, ImageMediaType, ImageRecognitionRequest, MealPlanRequest,
    ProviderId,
};
use orchestrator::{CancellationToken, OrchestrationError, Orchestrator};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MealwiseConfig;

#[derive(Debug, Parser)]
#[command(name = "mealwise", version, about = "Meal plans and ingredient recognition from a pool of LLM providers")]
struct Cli {
    /// Configuration file (defaults to ./mealwise.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate meal suggestions from ingredients on hand.
    Plan(PlanArgs),
    /// Identify ingredients in a photo.
    Recognize(RecognizeArgs),
    /// Show which providers are available, cooling down or unconfigured.
    Status,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Ingredient on hand; repeat for several.
    #[arg(short, long = "ingredient", required = true)]
    ingredients: Vec<String>,

    /// Dietary restriction, e.g. `vegetarian`; repeat for several.
    #[arg(short, long = "diet")]
    diets: Vec<String>,

    #[arg(long)]
    cuisine: Option<String>,

    #[arg(long, default_value_t = 2)]
    servings: u32,

    #[arg(long, default_value_t = 3)]
    meals: u32,

    /// Free-text note passed to the model.
    #[arg(long)]
    notes: Option<String>,

    /// Provider to try first.
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Debug, Args)]
struct RecognizeArgs {
    /// JPEG, PNG, WebP or GIF file.
    #[arg(long)]
    image: PathBuf,

    /// Context for the model, e.g. "fridge shelf".
    #[arg(long)]
    hint: Option<String>,

    /// Provider to try first. Ignored with `--consensus`.
    #[arg(long)]
    provider: Option<String>,

    /// Ask several providers and keep the items they agree on.
    #[arg(long)]
    consensus: bool,
}

/// Failure envelope printed on stdout. Carries class labels only; raw
/// provider messages go to the log.
#[derive(Debug, Serialize)]
struct FailureReport<'a> {
    class: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attempts: Vec<AttemptSummary<'a>>,
}

#[derive(Debug, Serialize)]
struct AttemptSummary<'a> {
    provider: &'a ProviderId,
    class: &'static str,
}

impl<'a> FailureReport<'a> {
    fn new(error: &'a OrchestrationError) -> Self {
        Self {
            class: error.class(),
            message: error.to_string(),
            retry_after_secs: error.retry_after().map(|d| d.as_secs()),
            attempts: error
                .attempts()
                .iter()
                .map(|a| AttemptSummary {
                    provider: &a.provider,
                    class: a.class(),
                })
                .collect(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config =
        MealwiseConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _telemetry = observability::init(config.otlp_endpoint().as_deref())?;

    let orchestrator = providers::build_orchestrator(&config)?;
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Plan(args) => plan(&orchestrator, args, &cancel).await,
        Command::Recognize(args) => recognize(&orchestrator, args, &cancel).await,
        Command::Status => print_json(&orchestrator.status()),
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}

async fn plan(
    orchestrator: &Orchestrator,
    args: PlanArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut request = MealPlanRequest::new(args.ingredients)
        .with_restrictions(args.diets)
        .with_servings(args.servings)
        .with_meal_count(args.meals);
    if let Some(cuisine) = args.cuisine {
        request = request.with_cuisine(cuisine);
    }
    if let Some(notes) = args.notes {
        request = request.with_notes(notes);
    }
    let preferred = parse_provider(args.provider)?;

    let outcome = orchestrator
        .generate_with_cancel(&request.into(), preferred.as_ref(), cancel)
        .await;
    report(outcome)
}

async fn recognize(
    orchestrator: &Orchestrator,
    args: RecognizeArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let image = load_image(&args.image).await?;
    let mut request = ImageRecognitionRequest::new(image);
    if let Some(hint) = args.hint {
        request = request.with_hint(hint);
    }
    let request = GenerationRequest::from(request);

    if args.consensus {
        if args.provider.is_some() {
            warn!("--provider is ignored with --consensus");
        }
        let outcome = orchestrator.cross_validate(&request, cancel).await;
        return report(outcome);
    }

    let preferred = parse_provider(args.provider)?;
    let outcome = orchestrator
        .generate_with_cancel(&request, preferred.as_ref(), cancel)
        .await;
    report(outcome)
}

fn parse_provider(name: Option<String>) -> anyhow::Result<Option<ProviderId>> {
    name.map(|n| ProviderId::new(n).ok_or_else(|| anyhow!("--provider must not be blank")))
        .transpose()
}

/// Reads and base64-encodes an image, taking the media type from its
/// extension.
async fn load_image(path: &Path) -> anyhow::Result<EncodedImage> {
    let media_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageMediaType::from_extension)
        .ok_or_else(|| anyhow!("unsupported image type: {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    EncodedImage::new(media_type, STANDARD.encode(bytes))
        .ok_or_else(|| anyhow!("image file is empty: {}", path.display()))
}

/// Prints a result, or the failure envelope followed by a non-zero exit.
fn report<T: Serialize>(outcome: Result<T, OrchestrationError>) -> anyhow::Result<()> {
    match outcome {
        Ok(value) => {
            info!("run completed");
            print_json(&value)
        }
        Err(error) => {
            for attempt in error.attempts() {
                warn!(provider = %attempt.provider, reason = %attempt.reason, "provider attempt failed");
            }
            print_json(&FailureReport::new(&error))?;
            Err(error.into())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}
