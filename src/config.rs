use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WatchtowerError};
use crate::types::MergeMethod;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Queries {
    pub needs_review: String,
    pub my_prs: String,
}

impl Default for Queries {
    fn default() -> Self {
        Self {
            needs_review: "review-requested:@me state:open".to_string(),
            my_prs: "author:@me state:open".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub refresh_interval_secs: u64,
    /// Maximum records fetched per query.
    pub limit: u32,
    pub token_env: Option<String>,
    pub token_command: Option<String>,
    pub merge_method: MergeMethod,
    pub queries: Queries,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 120,
            limit: 30,
            token_env: Some("GITHUB_TOKEN".to_string()),
            token_command: Some("gh auth token".to_string()),
            merge_method: MergeMethod::default(),
            queries: Queries::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub workflow: String,
    pub git_ref: Option<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            workflow: "agent-fix.yml".to_string(),
            git_ref: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub automation: AutomationConfig,
    pub storage: StorageConfig,
}

/// ~/.config/watchtower/config.toml (Linux) or the platform equivalent
pub fn config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("watchtower").join("config.toml"))
}

/// Directory for the status database and the log file.
pub fn data_dir() -> Option<PathBuf> {
    Some(dirs::data_dir()?.join("watchtower"))
}

impl Config {
    /// Loads the config from `path`, or from the default location when `None`.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match config_path() {
                Some(p) => p,
                None => return Ok(Config::default()),
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e.into()),
        };

        Self::parse(&content)
            .map_err(|e| WatchtowerError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.github.refresh_interval_secs.max(1))
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage
            .database
            .clone()
            .or_else(|| Some(data_dir()?.join("state.db")))
    }
}
