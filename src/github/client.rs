//! reqwest-backed [`ActionsApi`].
//!
//! Status codes are interpreted here and nowhere else. Transient failures
//! are retried with jittered exponential backoff; everything else is mapped
//! onto [`HistoryError`] and returned.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    ActionsApi, ArchiveFormat, ArtifactList, Repo, RunStatusFilter, WorkflowList, WorkflowRunList,
};
use crate::config::GitHubConfig;
use crate::error::{HistoryError, HistoryResult};

const USER_AGENT_VALUE: &str = concat!("checktrend/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Largest page size the listing endpoints accept.
const PER_PAGE: u32 = 100;
/// Listings longer than this many pages are treated as a broken response.
const MAX_PAGES: u32 = 100;

/// GitHub REST client for the Actions endpoints.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> HistoryResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        default_headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| HistoryError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            max_retries: config.max_retries,
        })
    }

    fn repo_url(&self, repo: &Repo, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/actions/{}",
            self.base_url, repo.owner, repo.name, rest
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> HistoryResult<T> {
        let response = self.request(url, query).await?;
        let body = response.bytes().await.map_err(|e| HistoryError::Network {
            message: format!("failed to read response body: {}", e),
        })?;
        serde_json::from_slice(&body).map_err(|e| HistoryError::InvalidResponse {
            message: format!("{}: {}", url, e),
        })
    }

    /// Fetch every page of a listing and return it as one list.
    ///
    /// Stops once `total_count` items are collected or a page comes back
    /// short, whichever happens first.
    async fn get_all_pages<T: Paged>(&self, url: &str) -> HistoryResult<T> {
        let mut all = T::default();

        for page in 1..=MAX_PAGES {
            let next: T = self
                .get_json(
                    url,
                    &[
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let short = next.len() < PER_PAGE as usize;
            all.append(next);

            if short || all.len() as u64 >= all.total_count() {
                debug!(%url, pages = page, items = all.len(), "listing complete");
                return Ok(all);
            }
        }

        Err(HistoryError::InvalidResponse {
            message: format!("{}: listing did not end after {} pages", url, MAX_PAGES),
        })
    }

    /// GET with retry for transient failures.
    async fn request(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> HistoryResult<reqwest::Response> {
        let mut retries = 0;

        loop {
            match self.request_once(url, query).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let backoff = backoff_for(&e, retries);

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> HistoryResult<reqwest::Response> {
        debug!(%url, ?query, "GET");
        let mut request = self.client.get(url).query(query);

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        Err(map_status(response).await)
    }
}

async fn map_status(response: reqwest::Response) -> HistoryError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let rate_limit_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");

    match status {
        StatusCode::UNAUTHORIZED => HistoryError::Unauthorized {
            message: "invalid or expired token".to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => HistoryError::RateLimited { retry_after },
        StatusCode::FORBIDDEN if rate_limit_exhausted || retry_after.is_some() => {
            HistoryError::RateLimited { retry_after }
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                body.chars().take(200).collect()
            };
            HistoryError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// A paginated listing payload.
trait Paged: DeserializeOwned + Default {
    fn total_count(&self) -> u64;
    fn len(&self) -> usize;
    /// Add the items of a later page. Its `total_count` replaces ours.
    fn append(&mut self, next: Self);
}

impl Paged for WorkflowList {
    fn total_count(&self) -> u64 {
        self.total_count
    }

    fn len(&self) -> usize {
        self.workflows.len()
    }

    fn append(&mut self, next: Self) {
        self.total_count = next.total_count;
        self.workflows.extend(next.workflows);
    }
}

impl Paged for ArtifactList {
    fn total_count(&self) -> u64 {
        self.total_count
    }

    fn len(&self) -> usize {
        self.artifacts.len()
    }

    fn append(&mut self, next: Self) {
        self.total_count = next.total_count;
        self.artifacts.extend(next.artifacts);
    }
}

fn backoff_for(err: &HistoryError, attempt: u32) -> Duration {
    match err {
        HistoryError::RateLimited {
            retry_after: Some(retry_after),
        } => (*retry_after).min(MAX_BACKOFF),
        _ => {
            let base = Duration::from_secs(1 << attempt.min(5)).min(MAX_BACKOFF);
            let jittered_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
            Duration::from_millis(jittered_ms.max(10))
        }
    }
}

#[async_trait::async_trait]
impl ActionsApi for GitHubClient {
    async fn list_workflows(&self, repo: &Repo) -> HistoryResult<WorkflowList> {
        let url = self.repo_url(repo, "workflows");
        self.get_all_pages(&url).await
    }

    async fn list_workflow_runs(
        &self,
        repo: &Repo,
        workflow_id: u64,
        status: RunStatusFilter,
        per_page: u32,
    ) -> HistoryResult<WorkflowRunList> {
        let url = self.repo_url(repo, &format!("workflows/{}/runs", workflow_id));
        self.get_json(
            &url,
            &[
                ("status", status.as_str().to_string()),
                ("per_page", per_page.to_string()),
            ],
        )
        .await
    }

    async fn list_run_artifacts(&self, repo: &Repo, run_id: u64) -> HistoryResult<ArtifactList> {
        let url = self.repo_url(repo, &format!("runs/{}/artifacts", run_id));
        self.get_all_pages(&url).await
    }

    async fn download_artifact(
        &self,
        repo: &Repo,
        artifact_id: u64,
        format: ArchiveFormat,
    ) -> HistoryResult<Bytes> {
        // GitHub answers with a 302 to blob storage; reqwest follows it and
        // drops the Authorization header on the cross-origin hop.
        let url = self.repo_url(repo, &format!("artifacts/{}/{}", artifact_id, format.as_str()));
        let response = self.request(&url, &[]).await?;
        response.bytes().await.map_err(|e| HistoryError::Network {
            message: format!("failed to read artifact {}: {}", artifact_id, e),
        })
    }
}
