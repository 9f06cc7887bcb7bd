use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use checktrend::{ArtifactName, Config, Repo};

#[derive(Parser)]
#[command(
    name = "checktrend",
    about = "Pass/fail history for CI checks, carried between workflow runs as a JSON artifact",
    version,
    long_about = None
)]
struct Cli {
    /// TOML config file (defaults to $CHECKTREND_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact name; also the stem of the .zip and .json files
    #[arg(long, global = true)]
    artifact_name: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the artifact from the last successful run of a workflow
    Fetch {
        /// Repository as owner/name (defaults to $GITHUB_REPOSITORY)
        #[arg(long)]
        repo: Option<String>,

        /// Workflow display name
        #[arg(long)]
        workflow: String,

        /// Scratch directory for the download (defaults to a temporary directory)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Write this run's check results as the new artifact
    Write {
        /// Check result as NAME=pass or NAME=fail; repeat in report order
        #[arg(long = "check", value_name = "NAME=RESULT", value_parser = parse_check)]
        checks: Vec<(String, bool)>,

        /// Directory to write <artifact-name>.json into
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn parse_check(s: &str) -> Result<(String, bool), String> {
    let (name, result) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=RESULT, got {:?}", s))?;
    if name.is_empty() {
        return Err("check name is empty".to_string());
    }
    let passed = match result.to_ascii_lowercase().as_str() {
        "pass" | "passed" | "success" | "true" => true,
        "fail" | "failed" | "failure" | "false" => false,
        other => return Err(format!("unknown result {:?}; use pass or fail", other)),
    };
    Ok((name.to_string(), passed))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // stdout carries the artifact text, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    config.apply_env();
    if let Some(name) = cli.artifact_name {
        config.artifact.name = ArtifactName::new(name)?;
    }

    match cli.command {
        Commands::Fetch {
            repo,
            workflow,
            work_dir,
        } => {
            let repo: Repo = repo
                .or_else(|| config.github.repository.clone())
                .context("no repository given; pass --repo or set GITHUB_REPOSITORY")?
                .parse()?;

            // Keep the temporary directory alive until the lookup finishes.
            let scratch = match work_dir {
                Some(_) => None,
                None => Some(tempfile::tempdir().context("failed to create scratch directory")?),
            };
            let work_dir = work_dir
                .or_else(|| scratch.as_ref().map(|d| d.path().to_path_buf()))
                .context("no work directory")?;

            tracing::info!(%repo, %workflow, work_dir = %work_dir.display(), "Fetching previous artifact");
            match checktrend::fetch_previous(&config, &repo, &workflow, &work_dir).await? {
                Some(text) => println!("{}", text),
                None => tracing::info!("No previous artifact; starting fresh history"),
            }
        }
        Commands::Write { checks, output_dir } => {
            if let Some(dir) = output_dir {
                config.artifact.output_dir = dir;
            }
            tracing::info!(checks = checks.len(), "Writing artifact");
            let path = checktrend::record(&config, checks).await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
