use tracing::debug;

use crate::config::GitHubConfig;
use crate::error::{Result, WatchtowerError};

/// Try to run a CLI command and capture stdout as a token
fn try_cli_token(command: &str) -> Option<String> {
    let output = std::process::Command::new("sh")
        .args(["-c", command])
        .output()
        .ok()?;

    if output.status.success() {
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !token.is_empty() {
            return Some(token);
        }
    }
    None
}

fn env_token(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve a GitHub token, trying in order:
/// 1. The configured environment variable
/// 2. The configured CLI command (`gh auth token` by default)
pub fn load_token(config: &GitHubConfig) -> Result<String> {
    if let Some(var) = &config.token_env {
        if let Some(token) = env_token(var) {
            debug!(source = %var, "using token from environment");
            return Ok(token);
        }
    }

    if let Some(cmd) = &config.token_command {
        if let Some(token) = try_cli_token(cmd) {
            debug!(source = %cmd, "using token from command");
            return Ok(token);
        }
    }

    let mut tried = Vec::new();
    if let Some(var) = &config.token_env {
        tried.push(format!("${}", var));
    }
    if let Some(cmd) = &config.token_command {
        tried.push(format!("`{}`", cmd));
    }
    Err(WatchtowerError::Auth(if tried.is_empty() {
        "no token source configured".to_string()
    } else {
        format!("no GitHub token found (tried {})", tried.join(", "))
    }))
}
