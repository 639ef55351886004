//! LLM module - language model backends for the decision oracle
//!
//! Ollama for local models, any OpenAI-compatible endpoint for hosted ones.

pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::core::config::{Config, ProviderType};
use crate::core::Result;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

/// Create the LLM provider selected in configuration
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = match config.provider {
        ProviderType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        ProviderType::OpenAi => Arc::new(OpenAiClient::from_config(config)?),
    };
    Ok(provider)
}

/// Shorten a payload for debug logs
pub(crate) fn preview(text: &str) -> String {
    const LIMIT: usize = 500;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
