//! Configuration loading, validation, and management for CopyCat.
//!
//! Loads configuration from `~/.copycat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.copycat/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completions backend
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop budget
    #[serde(default)]
    pub agent: AgentConfig,

    /// Site cloner settings
    #[serde(default)]
    pub cloner: ClonerConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider label used in logs
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// OpenAI-compatible base URL (the `/chat/completions` parent)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Wire role used for tool observations
    #[serde(default = "default_observation_role")]
    pub observation_role: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_observation_role() -> String {
    "developer".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            observation_role: default_observation_role(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("observation_role", &self.observation_role)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget per run; 0 disables the deadline
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_deadline_secs() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClonerConfig {
    /// Root under which every clone gets a `{siteId}` directory
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Upper bound on waiting for a page to load
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// How long the network must stay idle after load before the DOM is read
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,

    /// Chromium binary; auto-detected when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-asset download timeout
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./public/cloned-sites")
}
fn default_load_timeout() -> u64 {
    30
}
fn default_settle_millis() -> u64 {
    500
}
fn default_user_agent() -> String {
    concat!("copycat/", env!("CARGO_PKG_VERSION")).into()
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_true() -> bool {
    true
}

impl Default for ClonerConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            load_timeout_secs: default_load_timeout(),
            settle_millis: default_settle_millis(),
            chrome_executable: None,
            headless: true,
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,

    #[serde(default = "default_github_base_url")]
    pub github_base_url: String,

    #[serde(default)]
    pub shell: ShellConfig,
}

fn default_weather_base_url() -> String {
    "https://wttr.in".into()
}
fn default_github_base_url() -> String {
    "https://api.github.com".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            weather_base_url: default_weather_base_url(),
            github_base_url: default_github_base_url(),
            shell: ShellConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Whether `executeCommand` is registered at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed base commands. Empty = all commands allowed.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Working directory for commands; defaults to the clone root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "wc", "grep", "find", "tree", "du",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_shell_timeout() -> u64 {
    30
}
fn default_max_output_bytes() -> usize {
    16 * 1024
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_commands: default_allowed_commands(),
            timeout_secs: default_shell_timeout(),
            max_output_bytes: default_max_output_bytes(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.copycat/config.toml).
    ///
    /// Environment overrides (first match wins):
    /// - API key: `COPYCAT_API_KEY`, `OPENAI_API_KEY`
    /// - Base URL: `COPYCAT_BASE_URL`, `BASE_URL`
    /// - Model: `COPYCAT_MODEL`, `MODEL_NAME`
    /// - Clone root: `COPYCAT_CLONE_ROOT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if self.provider.api_key.is_none() {
            self.provider.api_key = first(&["COPYCAT_API_KEY", "OPENAI_API_KEY"]);
        }
        if let Some(url) = first(&["COPYCAT_BASE_URL", "BASE_URL"]) {
            self.provider.base_url = url;
        }
        if let Some(model) = first(&["COPYCAT_MODEL", "MODEL_NAME"]) {
            self.provider.model = model;
        }
        if let Some(root) = lookup("COPYCAT_CLONE_ROOT") {
            self.cloner.output_root = PathBuf::from(root);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".copycat")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.cloner.output_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "cloner.output_root must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
