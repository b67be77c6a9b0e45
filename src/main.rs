use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use docforge::{Config, Pipeline};

/// docforge: turn a free-form request into a structured long-form document.
#[derive(Parser, Debug)]
#[command(name = "docforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the plan/retrieve/write pipeline for one request.
    Generate {
        /// The request text.
        #[arg(short, long)]
        request: Option<String>,

        /// Read the request text from a file instead of --request.
        #[arg(long)]
        request_file: Option<PathBuf>,

        /// Path to a YAML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to write persisted artifacts and the final document to.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match cli.command {
        Command::Generate {
            request,
            request_file,
            config,
            output_dir,
        } => handle_generate(request, request_file, config, output_dir).await,
    }
}

async fn handle_generate(
    request: Option<String>,
    request_file: Option<PathBuf>,
    config_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let request_text = resolve_request(request, request_file)?;

    let mut config = Config::load(config_path.as_ref()).context("failed to load configuration")?;
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }

    info!(output_dir = %config.output.dir.display(), "starting docforge pipeline");

    let pipeline = Pipeline::new(&config).context("failed to construct pipeline")?;
    let (document, summary) = pipeline
        .run(&request_text)
        .await
        .map_err(|e| anyhow::anyhow!("pipeline run failed: {e}"))?;

    println!("{document}");

    eprintln!("\n========================================");
    eprintln!("docforge run complete");
    eprintln!("========================================");
    eprintln!("started:  {}", summary.started_at);
    eprintln!("finished: {}", summary.finished_at);
    eprintln!("llm calls: {}", summary.llm_calls);
    eprintln!("retrieval calls: {}", summary.retrieval_calls);
    eprintln!("leaves: {}", summary.leaf_count);
    eprintln!("low-quality leaves: {}", summary.writer_low_quality_leaves);
    if summary.is_clean() {
        eprintln!("no leaf failures");
    } else {
        eprintln!("{} leaf failure(s):", summary.failures.len());
        for failure in &summary.failures {
            eprintln!(
                "  [{}] leaf {}.{}: {}",
                failure.stage, failure.part_index, failure.leaf_index, failure.reason
            );
        }
    }

    Ok(())
}

fn resolve_request(request: Option<String>, request_file: Option<PathBuf>) -> Result<String> {
    match (request, request_file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .context(format!("failed to read request file: {}", path.display())),
        (Some(_), Some(_)) => anyhow::bail!("pass only one of --request or --request-file"),
        (None, None) => anyhow::bail!("either --request or --request-file is required"),
    }
}
