//! Configuration management for browser-pilot
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/browser-pilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::error::{PilotError, Result};

/// Main configuration for browser-pilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which model backend answers oracle requests
    #[serde(default)]
    pub provider: ProviderType,
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// OpenAI-compatible endpoint configuration
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,
    /// Snapshot size bounds
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Model backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Ollama,
    OpenAi,
}

impl Default for ProviderType {
    fn default() -> Self {
        match env::var("PILOT_PROVIDER").as_deref() {
            Ok("ollama") => Self::Ollama,
            Ok("openai") => Self::OpenAi,
            _ if env::var("OPENAI_API_KEY").is_ok() => Self::OpenAi,
            _ => Self::Ollama,
        }
    }
}

impl ProviderType {
    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Ollama => "qwen3:8b",
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(PilotError::config(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API base URL
    pub base_url: String,
    /// API key; read from the environment, never written to disk
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Decision model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name passed to the provider
    pub name: String,
    /// Sampling temperature for decisions
    pub temperature: f32,
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Session name for agent-browser
    pub session_name: String,
    /// Whether to run in headed mode (visible browser)
    pub headed: bool,
    /// Timeout for a single agent-browser command in ms
    pub timeout_ms: u64,
    /// Delay after an action before measuring its effect, in ms
    pub settle_ms: u64,
    /// Page to open before the first observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
}

/// Agent loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Completed cycles before the run ends as exhausted
    /// Default: 50
    pub max_steps: usize,
    /// Consecutive invalid decisions tolerated within one Deciding stage
    /// Default: 3
    pub max_decision_retries: usize,
    /// Consecutive error outcomes / invalid decisions before a fatal stop
    /// Default: 5
    pub max_consecutive_errors: usize,
    /// Consecutive stale handles before a fatal stop
    /// Default: 5
    pub max_consecutive_stale: usize,
    /// History entries included in each oracle request
    /// Default: 10
    pub history_window: usize,
    /// Timeout for each browser or oracle call, in seconds
    /// Default: 30
    pub call_timeout_secs: u64,
    /// Whether to show debug output
    pub debug: bool,
}

/// Bounds applied by the snapshotter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Maximum indexed elements per snapshot
    pub max_elements: usize,
    /// Total character budget for elements plus text
    pub max_chars: usize,
    /// Ceiling for the condensed page text alone
    pub max_text_chars: usize,
    /// Maximum characters per element label
    pub max_label_chars: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: env::var("OPENAI_API_KEY").ok(),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let name = env::var("PILOT_MODEL")
            .unwrap_or_else(|_| ProviderType::default().default_model().to_string());
        Self {
            name,
            temperature: 0.1,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            session_name: env::var("PILOT_BROWSER_SESSION")
                .unwrap_or_else(|_| "browser-pilot".to_string()),
            headed: env::var("PILOT_BROWSER_HEADED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            timeout_ms: 30000,
            settle_ms: 500,
            start_url: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: env::var("PILOT_MAX_STEPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            max_decision_retries: 3,
            max_consecutive_errors: 5,
            max_consecutive_stale: 5,
            history_window: 10,
            call_timeout_secs: 30,
            debug: env::var("PILOT_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_elements: 150,
            max_chars: 12000,
            max_text_chars: 4000,
            max_label_chars: 80,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("browser-pilot")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > config file > env vars > defaults
    pub fn load() -> Self {
        // Credentials usually live in .env
        let _ = dotenvy::dotenv();

        Self::load_or_default(&Self::config_file())
    }

    /// Load `path` if it exists; a broken file is reported and ignored
    fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PilotError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| PilotError::config(format!("Failed to read config: {}", e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| PilotError::config(format!("Failed to parse config: {}", e)))?;

        // Keys are skipped on save, so pick them up again from the environment
        if config.openai.api_key.is_none() {
            config.openai.api_key = env::var("OPENAI_API_KEY").ok();
        }

        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    PilotError::config(format!("Failed to create config dir: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| PilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Check that all limits are usable
    pub fn validate(&self) -> Result<()> {
        let agent = &self.agent;
        let limits = [
            ("agent.max_steps", agent.max_steps),
            ("agent.max_decision_retries", agent.max_decision_retries),
            ("agent.max_consecutive_errors", agent.max_consecutive_errors),
            ("agent.max_consecutive_stale", agent.max_consecutive_stale),
            ("snapshot.max_elements", self.snapshot.max_elements),
            ("snapshot.max_chars", self.snapshot.max_chars),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(PilotError::config(format!("{} must be greater than 0", name)));
        }
        if agent.call_timeout_secs == 0 {
            return Err(PilotError::config(
                "agent.call_timeout_secs must be greater than 0",
            ));
        }
        if let Some(url) = &self.browser.start_url {
            url::Url::parse(url)
                .map_err(|e| PilotError::config(format!("Invalid start_url '{}': {}", url, e)))?;
        }
        Ok(())
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }
}
