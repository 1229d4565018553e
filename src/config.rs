use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "slack-claude-gateway";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Environment variable holding the shared secret checked against `x-token`.
    pub server_token_env: String,
    /// Instruction sent by `/claude/reset`.
    pub reset_prompt: String,
    /// Ping interval for the `/v1/complete` event stream.
    pub keep_alive_secs: u64,
    pub slack: SlackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
    pub user_token_env: String,
    pub claude_user_id_env: String,
    pub poll_interval_ms: u64,
    pub reply_timeout_secs: u64,
    /// Suffix the Claude app keeps on its message while it is still writing.
    pub typing_marker: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8089,
            server_token_env: "SERVER_TOKEN".to_string(),
            reset_prompt: "请忘记上面的会话内容".to_string(),
            keep_alive_secs: 2,
            slack: SlackConfig::default(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            user_token_env: "SLACK_USER_TOKEN".to_string(),
            claude_user_id_env: "CLAUDE_BOT_ID".to_string(),
            poll_interval_ms: 500,
            reply_timeout_secs: 120,
            typing_marker: "_Typing…_".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// The shared secret, if configured. An empty value counts as unset.
    pub fn resolve_server_token(&self) -> Option<String> {
        std::env::var(&self.server_token_env)
            .ok()
            .filter(|token| !token.is_empty())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl SlackConfig {
    pub fn resolve_user_token(&self) -> Result<String> {
        require_env(&self.user_token_env, "Set it to a Slack user token (xoxp-...).")
    }

    pub fn resolve_claude_user_id(&self) -> Result<String> {
        require_env(
            &self.claude_user_id_env,
            "Set it to the member ID of the Claude app in your workspace.",
        )
    }
}

fn require_env(name: &str, hint: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(GatewayError::config(format!(
            "Environment variable '{}' not set. {}",
            name, hint
        ))),
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(format!("{CONFIG_DIR}.toml"))];

    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join(CONFIG_DIR)
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join(CONFIG_DIR).join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join(CONFIG_DIR).join("config.toml"));
        }
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(format!(".{CONFIG_DIR}.toml")));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
