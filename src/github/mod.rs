//! GitHub Actions REST surface used by the locator.
//!
//! The locator only depends on [`ActionsApi`]; [`client::GitHubClient`] is the
//! production implementation and tests substitute in-memory fakes.

pub mod client;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};

pub use client::GitHubClient;

/// Repository identifier (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for Repo {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(HistoryError::Config {
                message: format!("repository must be in owner/name form, got {:?}", s),
            }),
        }
    }
}

/// A workflow definition registered in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,
    /// Display name (the `name:` key of the workflow file).
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// One execution of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

/// An artifact uploaded by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowList {
    pub total_count: u64,
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunList {
    pub total_count: u64,
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactList {
    pub total_count: u64,
    pub artifacts: Vec<RunArtifact>,
}

/// `status` filter accepted by the list-workflow-runs endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatusFilter {
    Success,
}

impl RunStatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
        }
    }
}

/// Archive format for artifact downloads. GitHub only serves zip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    #[default]
    Zip,
}

impl ArchiveFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
        }
    }
}

/// The four Actions endpoints the locator needs.
#[async_trait::async_trait]
pub trait ActionsApi: Send + Sync {
    async fn list_workflows(&self, repo: &Repo) -> HistoryResult<WorkflowList>;

    /// Most recent runs first.
    async fn list_workflow_runs(
        &self,
        repo: &Repo,
        workflow_id: u64,
        status: RunStatusFilter,
        per_page: u32,
    ) -> HistoryResult<WorkflowRunList>;

    async fn list_run_artifacts(&self, repo: &Repo, run_id: u64) -> HistoryResult<ArtifactList>;

    async fn download_artifact(
        &self,
        repo: &Repo,
        artifact_id: u64,
        format: ArchiveFormat,
    ) -> HistoryResult<Bytes>;
}

#[async_trait::async_trait]
impl<T: ActionsApi + ?Sized> ActionsApi for &T {
    async fn list_workflows(&self, repo: &Repo) -> HistoryResult<WorkflowList> {
        (**self).list_workflows(repo).await
    }

    async fn list_workflow_runs(
        &self,
        repo: &Repo,
        workflow_id: u64,
        status: RunStatusFilter,
        per_page: u32,
    ) -> HistoryResult<WorkflowRunList> {
        (**self)
            .list_workflow_runs(repo, workflow_id, status, per_page)
            .await
    }

    async fn list_run_artifacts(&self, repo: &Repo, run_id: u64) -> HistoryResult<ArtifactList> {
        (**self).list_run_artifacts(repo, run_id).await
    }

    async fn download_artifact(
        &self,
        repo: &Repo,
        artifact_id: u64,
        format: ArchiveFormat,
    ) -> HistoryResult<Bytes> {
        (**self).download_artifact(repo, artifact_id, format).await
    }
}
