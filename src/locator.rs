//! Finds the artifact left by the last successful run of a workflow.
//!
//! Lookup order:
//!
//! 1. the workflow whose display name matches exactly,
//! 2. its most recent successful run,
//! 3. the artifact in that run with the configured name.
//!
//! A miss at any step is `Ok(None)`, the normal situation on a project's
//! first run. Failures to talk to the API or to read what was downloaded
//! are errors.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::archive::ArchiveExtractor;
use crate::artifact::ArtifactName;
use crate::error::{HistoryError, HistoryResult};
use crate::github::{ActionsApi, ArchiveFormat, Repo, RunStatusFilter};

/// Only the newest successful run is inspected.
const RUNS_PER_PAGE: u32 = 1;

/// Default subdirectory of the work dir that archives are unpacked into.
pub const DEFAULT_EXTRACT_DIR: &str = "logs";

/// Locates and reads the previous run's history artifact.
pub struct ArtifactLocator<A, X> {
    api: A,
    extractor: X,
    name: ArtifactName,
    work_dir: PathBuf,
    extract_dir: PathBuf,
}

impl<A: ActionsApi, X: ArchiveExtractor> ArtifactLocator<A, X> {
    /// `work_dir` receives the downloaded archive and the unpacked files.
    pub fn new(api: A, extractor: X, name: ArtifactName, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            extractor,
            name,
            work_dir: work_dir.into(),
            extract_dir: PathBuf::from(DEFAULT_EXTRACT_DIR),
        }
    }

    /// Unpack into `<work_dir>/<dir>` instead of `<work_dir>/logs`.
    pub fn with_extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = dir.into();
        self
    }

    pub fn artifact_name(&self) -> &ArtifactName {
        &self.name
    }

    /// Path the downloaded zip is written to.
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join(self.name.archive_file_name())
    }

    /// Path of the JSON file read after extraction.
    pub fn extracted_json_path(&self) -> PathBuf {
        self.work_dir
            .join(&self.extract_dir)
            .join(self.name.json_file_name())
    }

    /// Return the raw text of the previous artifact, or `None` if there is none yet.
    ///
    /// The text is returned verbatim; use [`crate::Artifact::from_json`] to parse it.
    pub async fn locate(&self, repo: &Repo, workflow_name: &str) -> HistoryResult<Option<String>> {
        info!(%repo, workflow = %workflow_name, "looking for previous artifact");

        let workflows = self.api.list_workflows(repo).await?;
        let available: Vec<&str> = workflows.workflows.iter().map(|w| w.name.as_str()).collect();
        info!(?available, "available workflows");

        let Some(workflow) = workflows.workflows.iter().find(|w| w.name == workflow_name) else {
            error!(workflow = %workflow_name, "no workflow found with that name");
            return Ok(None);
        };
        info!(workflow = %workflow.name, id = workflow.id, "found workflow");

        let runs = self
            .api
            .list_workflow_runs(repo, workflow.id, RunStatusFilter::Success, RUNS_PER_PAGE)
            .await?;

        if runs.total_count == 0 {
            error!(workflow = %workflow.name, "no successful runs detected; is this the first run?");
            return Ok(None);
        }

        let started: Vec<String> = runs
            .workflow_runs
            .iter()
            .map(|r| {
                r.run_started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            })
            .collect();
        info!(total = runs.total_count, ?started, "found successful runs");

        // At most one run with the current page size. The first run decides
        // the outcome; older runs are never consulted.
        if let Some(run) = runs.workflow_runs.first() {
            info!(
                run_id = run.id,
                run_name = run.name.as_deref().unwrap_or(""),
                "searching run for artifact"
            );

            let artifacts = self.api.list_run_artifacts(repo, run.id).await?;
            let names: Vec<String> = artifacts
                .artifacts
                .iter()
                .map(|a| {
                    if a.expired {
                        format!("{} (expired)", a.name)
                    } else {
                        a.name.clone()
                    }
                })
                .collect();
            info!(total = artifacts.total_count, ?names, artifact = %self.name, "artifacts in run");

            let Some(artifact) = artifacts
                .artifacts
                .iter()
                .find(|a| a.name == self.name.as_str())
            else {
                info!(run_id = run.id, artifact = %self.name, "run has no matching artifact");
                return Ok(None);
            };

            // GitHub keeps listing artifacts past retention but answers 410 on download.
            if artifact.expired {
                info!(
                    run_id = run.id,
                    artifact_id = artifact.id,
                    artifact = %self.name,
                    "matching artifact has expired"
                );
                return Ok(None);
            }

            let payload = self
                .api
                .download_artifact(repo, artifact.id, ArchiveFormat::Zip)
                .await?;

            let text = self.unpack(&payload).await?;
            debug!(old_artifact = %text, "previous artifact");
            return Ok(Some(text));
        }

        Ok(None)
    }

    async fn unpack(&self, payload: &[u8]) -> HistoryResult<String> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| HistoryError::io(&self.work_dir, e))?;

        let archive = self.archive_path();
        tokio::fs::write(&archive, payload)
            .await
            .map_err(|e| HistoryError::io(&archive, e))?;

        // A reused work dir may still hold the file from an earlier lookup.
        let location = self.extracted_json_path();
        remove_stale(&location).await?;

        let dest = self.work_dir.join(&self.extract_dir);
        self.extractor.extract(&archive, &dest)?;
        info!(archive = %archive.display(), "artifact downloaded");

        info!(path = %location.display(), "artifact extracted");
        read_text(&location).await
    }
}

async fn remove_stale(path: &Path) -> HistoryResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed previously extracted file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HistoryError::io(path, e)),
    }
}

async fn read_text(path: &Path) -> HistoryResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(HistoryError::MissingFile {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(HistoryError::io(path, e)),
    }
}
