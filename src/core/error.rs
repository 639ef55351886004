//! Error types for browser-pilot
//!
//! One error enum covers both the infrastructure failures (HTTP, IO, config)
//! and the agent loop's recoverable taxonomy (stale handles, invalid
//! decisions, execution errors, timeouts).

use thiserror::Error;

use crate::core::types::ElementHandle;

/// Main error type for browser-pilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    /// Ollama connection or API errors
    #[error("Ollama error: {0}")]
    Ollama(String),

    /// OpenAI-compatible API errors
    #[error("OpenAI error: {0}")]
    OpenAi(String),

    /// Browser capability errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Element handle no longer resolves on the live page
    #[error("Stale handle {0}: element can no longer be located")]
    StaleHandle(ElementHandle),

    /// Oracle reply could not be turned into a valid proposal
    #[error("Invalid decision: {0}")]
    DecisionInvalid(String),

    /// A browser operation failed while executing a proposal
    #[error("Execution error: {0}")]
    Execution(String),

    /// An external call exceeded its time budget
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    /// Retry or error limits exhausted
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Agent-browser not installed
    #[error("agent-browser not found. Install with: npm install -g agent-browser && agent-browser install")]
    AgentBrowserNotFound,

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// Missing credentials for a hosted provider
    #[error("Missing API key for {0}. Set OPENAI_API_KEY or add it to .env")]
    MissingApiKey(String),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for browser-pilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// Create an Ollama error
    pub fn ollama(msg: impl Into<String>) -> Self {
        Self::Ollama(msg.into())
    }

    /// Create an OpenAI error
    pub fn openai(msg: impl Into<String>) -> Self {
        Self::OpenAi(msg.into())
    }

    /// Create a browser error
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    /// Create an invalid-decision error
    pub fn decision(msg: impl Into<String>) -> Self {
        Self::DecisionInvalid(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a timeout error for the named stage
    pub fn timeout(stage: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            secs,
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the agent loop may absorb this error and keep going
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Fatal(_)
                | Self::Config(_)
                | Self::AgentBrowserNotFound
                | Self::ModelNotFound(_)
                | Self::MissingApiKey(_)
        )
    }
}
