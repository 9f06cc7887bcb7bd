//! TOML configuration for checktrend.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration. Environment variables set by the Actions runner are
//! layered on top with [`Config::apply_env`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactName;
use crate::github::Repo;
use crate::locator::DEFAULT_EXTRACT_DIR;

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "CHECKTREND_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from the file named by `CHECKTREND_CONFIG`, falling back to defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "CHECKTREND_CONFIG set but file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Overlay `GITHUB_TOKEN`, `GITHUB_API_URL` and `GITHUB_REPOSITORY`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(url) = non_empty("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(repo) = non_empty("GITHUB_REPOSITORY") {
            match repo.parse::<Repo>() {
                Ok(repo) => self.github.repository = Some(repo.to_string()),
                Err(e) => warn!(error = %e, "ignoring malformed GITHUB_REPOSITORY"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// REST client settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API root, without a trailing slash.
    pub api_url: String,
    /// Bearer token. Needs `actions:read` on the repository.
    pub token: Option<String>,
    /// Default repository (`owner/name`) for `fetch`.
    pub repository: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries for transient failures (network, 429, 5xx).
    pub max_retries: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            repository: None,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

// Hand-written so the token never reaches the logs.
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("repository", &self.repository)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl GitHubConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Where the artifact lives locally and what it is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Artifact name; also the stem of the `.zip` and `.json` files.
    pub name: ArtifactName,
    /// Directory the writer puts `<name>.json` in.
    pub output_dir: PathBuf,
    /// Subdirectory of the work dir that downloaded archives are unpacked into.
    pub extract_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            name: ArtifactName::default(),
            output_dir: PathBuf::from("."),
            extract_dir: PathBuf::from(DEFAULT_EXTRACT_DIR),
        }
    }
}
