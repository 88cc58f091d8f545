//! ETER CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `eter.toml` (or `.eter/config.toml`) and
//!    apply environment overrides.
//! 2. **Wire observability**: configure `tracing-subscriber` with a text or
//!    JSON layer and, when configured, an OpenTelemetry OTLP exporter. All
//!    `tracing` spans and structured events emitted by every crate in the
//!    workspace flow through this layer.
//! 3. **Construct infrastructure**: create the concrete completion provider
//!    and run store and inject them into [`stages::PipelineService`]. The
//!    document ingestor is built only when `start --upload` needs it.
//! 4. **Render**: every command resumes the run from the store, performs one
//!    service call and prints the outcome. The binary holds no pipeline logic.

mod config;
mod telemetry;
mod view;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use ingest::WebhookIngestor;
use llm::{ChatCompletionsProvider, ChatSettings};
use pipeline::{DocumentIngestor, IdeaId, RunId};
use stages::{PipelineService, RunHandle, StageRunner, StepReport};
use store::FileRunStore;

use crate::config::Config;

type Service = PipelineService<ChatCompletionsProvider, FileRunStore>;

/// Content pipeline: analysis, ideation, research, narrative and writing,
/// with a review stop after every gated stage.
#[derive(Parser, Debug)]
#[command(name = "eter", version, subcommand_required = true, arg_required_else_help = true)]
struct RootArgs {
    /// Configuration file (defaults to .eter/config.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Tenant whose runs are used (overrides config and ETER_TENANT)
    #[arg(long, global = true, value_name = "ID")]
    tenant: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a run and generate the first stage
    Start(StartArgs),
    /// List runs, most recently updated first
    List,
    /// Show a run's stages and the current output
    Show { run: RunId },
    /// Approve the current stage and run forward to the next review
    Approve(ApproveArgs),
    /// Replace the current stage's output with the contents of a file
    Edit {
        run: RunId,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Discard the current stage's output and generate it again
    Regenerate { run: RunId },
    /// Run a stage again after a strict-policy failure
    Retry { run: RunId },
    /// Persist the run again
    Save { run: RunId },
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Run title
    #[arg(long)]
    title: String,

    /// Text file used as the analysis context
    #[arg(long, value_name = "FILE", conflicts_with = "upload")]
    context_file: Option<PathBuf>,

    /// Report uploaded to the ingestion webhook; its analysis becomes the context
    #[arg(long, value_name = "FILE")]
    upload: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApproveArgs {
    run: RunId,

    /// Idea ids to select before approving ideation
    #[arg(long = "select", value_name = "ID", num_args = 1..)]
    select: Vec<String>,

    /// New narrative block order, 1-based (e.g. 3,1,2)
    #[arg(long, value_name = "ORDER", value_delimiter = ',')]
    order: Vec<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = RootArgs::parse();
    let config = Config::load(args.config.as_deref())?;
    let _telemetry = telemetry::init(&config.telemetry)?;

    let tenant = config.tenant(args.tenant.as_deref())?;
    let service = build_service(&config)?;

    match args.command {
        Command::Start(start) => {
            let context = read_context(&config, &start).await?;
            let (handle, report) = service.start(tenant, &start.title, &context).await?;
            print_step(&service, &handle, &report).await;
        }
        Command::List => {
            print!("{}", view::render_list(&service.list(&tenant).await?));
        }
        Command::Show { run } => {
            let handle = service.resume(&tenant, run).await?;
            print!("{}", view::render_state(service.catalog(), &handle.snapshot().await));
        }
        Command::Approve(approve) => {
            let handle = service.resume(&tenant, approve.run).await?;
            for raw in &approve.select {
                let id = IdeaId::new(raw.as_str()).with_context(|| format!("Invalid idea id '{raw}'"))?;
                service.toggle_idea(&handle, &id).await?;
            }
            if !approve.order.is_empty() {
                let order = zero_based(&approve.order)?;
                service.reorder_blocks(&handle, &order).await?;
            }
            let report = service.approve(&handle).await?;
            print_step(&service, &handle, &report).await;
        }
        Command::Edit { run, file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let handle = service.resume(&tenant, run).await?;
            let report = service.edit(&handle, &content).await?;
            print_step(&service, &handle, &report).await;
        }
        Command::Regenerate { run } => {
            let handle = service.resume(&tenant, run).await?;
            let report = service.regenerate(&handle).await?;
            print_step(&service, &handle, &report).await;
        }
        Command::Retry { run } => {
            let handle = service.resume(&tenant, run).await?;
            let report = service.retry(&handle).await?;
            print_step(&service, &handle, &report).await;
        }
        Command::Save { run } => {
            let handle = service.resume(&tenant, run).await?;
            let report = service.save(&handle).await?;
            print!("{}", view::render_report(&report));
        }
    }
    Ok(())
}

fn build_service(config: &Config) -> Result<Service> {
    let api_key = std::env::var(&config.provider.api_key_env).ok();
    if api_key.is_none() {
        warn!(env = %config.provider.api_key_env, "No provider API key set; stages will fail or show demo output");
    }
    let provider = ChatCompletionsProvider::new(ChatSettings {
        name: config.provider.name.clone(),
        base_url: config.provider.base_url.clone(),
        api_key,
        timeout: config.provider_timeout(),
        referer: config.provider.referer.clone(),
        app_title: config.provider.app_title.clone(),
    })?;

    let mut runner = StageRunner::new(provider, config.pipeline.failure_policy);
    if let Some(model) = &config.provider.fallback_model {
        runner = runner.with_fallback_model(model.clone());
    }

    let store = FileRunStore::new(&config.store.dir);
    let service = PipelineService::new(config.catalog()?, runner, store);
    Ok(match &config.brand {
        Some(brand) => service.with_brand(brand.clone()),
        None => service,
    })
}

async fn read_context(config: &Config, args: &StartArgs) -> Result<String> {
    if let Some(path) = &args.context_file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    let Some(path) = &args.upload else {
        return Ok(String::new());
    };
    let Some(url) = &config.ingest.webhook_url else {
        bail!("--upload needs [ingest] webhook_url in the configuration");
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let ingestor = WebhookIngestor::new(url.clone(), Duration::from_secs(config.ingest.timeout_secs))?;
    let analysis = ingestor.ingest(&file_name(path), bytes).await?;
    Ok(analysis)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string()
}

fn zero_based(order: &[usize]) -> Result<Vec<usize>> {
    order
        .iter()
        .map(|&position| {
            position
                .checked_sub(1)
                .with_context(|| format!("Block positions start at 1, got {position}"))
        })
        .collect()
}

async fn print_step(service: &Service, handle: &RunHandle, report: &StepReport) {
    print!("{}", view::render_report(report));
    println!();
    print!("{}", view::render_state(service.catalog(), &handle.snapshot().await));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn test_approve_parses_selection_and_order() {
        let run = RunId::new_random();
        let args = RootArgs::parse_from([
            "eter",
            "--tenant",
            "studio",
            "approve",
            &run.to_string(),
            "--select",
            "idea-1",
            "idea-3",
            "--order",
            "3,1,2",
        ]);
        match args.command {
            Command::Approve(approve) => {
                assert_eq!(approve.run, run);
                assert_eq!(approve.select, vec!["idea-1", "idea-3"]);
                assert_eq!(zero_based(&approve.order).unwrap(), vec![2, 0, 1]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(args.tenant.as_deref(), Some("studio"));
    }

    #[test]
    fn test_zero_position_is_rejected() {
        assert!(zero_based(&[0, 1]).is_err());
    }

    #[test]
    fn test_start_rejects_both_sources() {
        assert!(RootArgs::try_parse_from([
            "eter", "start", "--title", "x", "--context-file", "a.txt", "--upload", "b.pdf"
        ])
        .is_err());
    }
}
