//! checktrend -- pass/fail history for CI checks across workflow runs.
//!
//! History is stored as a small JSON artifact attached to each run. At the
//! start of a run the previous artifact is fetched from the last successful
//! run of the workflow; at the end the current results are written out for
//! the runner to upload.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod error;
pub mod github;
pub mod locator;

pub use archive::{ArchiveExtractor, ZipExtractor};
pub use artifact::{Artifact, ArtifactName, ArtifactWriter, CheckRecord, Outcome, StatusPoint};
pub use config::Config;
pub use error::{HistoryError, HistoryResult};
pub use github::{ActionsApi, GitHubClient, Repo};
pub use locator::ArtifactLocator;

use std::path::{Path, PathBuf};

use anyhow::Result;

/// Fetch the previous run's artifact text using the GitHub client from `config`.
///
/// Scratch files are written under `work_dir`.
pub async fn fetch_previous(
    config: &Config,
    repo: &Repo,
    workflow: &str,
    work_dir: &Path,
) -> Result<Option<String>> {
    let client = GitHubClient::new(&config.github)?;
    let locator = ArtifactLocator::new(
        client,
        ZipExtractor,
        config.artifact.name.clone(),
        work_dir,
    )
    .with_extract_dir(&config.artifact.extract_dir);

    Ok(locator.locate(repo, workflow).await?)
}

/// Write this run's results to `<output_dir>/<name>.json`.
pub async fn record<I, S>(config: &Config, reports: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = (S, bool)>,
    S: Into<String>,
{
    let writer = ArtifactWriter::new(
        config.artifact.name.clone(),
        &config.artifact.output_dir,
    );
    Ok(writer.write(reports).await?)
}
