//! OpenAI-compatible chat completions client
//!
//! Works against api.openai.com or any server exposing the same
//! `/chat/completions` and `/models` routes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, PilotError, Result};
use crate::llm::preview;
use crate::llm::traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiClient {
    /// Create a client from configuration; fails without an API key
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openai
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PilotError::MissingApiKey("openai".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.openai.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.openai.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn build_request<'a>(
        model: &'a str,
        messages: &'a [Message],
        options: Option<GenerateOptions>,
    ) -> ChatRequest<'a> {
        let options = options.unwrap_or_default();
        ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }

    fn to_llm_response(response: ChatResponse) -> Result<LLMResponse> {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PilotError::openai("response contained no message content"))?;

        Ok(LLMResponse {
            content,
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            model: response.model,
        })
    }

    /// Pull the human-readable message out of an error body
    fn error_message(body: &str) -> String {
        serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.to_string())
    }
}

#[async_trait]
impl LLMProvider for OpenAiClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let request = Self::build_request(model, messages, options);
        debug!(model, messages = messages.len(), "openai chat request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PilotError::openai(format!(
                "API error ({}): {}",
                status,
                Self::error_message(&body)
            )));
        }
        debug!(response = %preview(&body), "openai chat response");

        let chat_response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| PilotError::openai(format!("Failed to parse response: {}", e)))?;
        Self::to_llm_response(chat_response)
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        Ok(self.list_models().await?.iter().any(|m| m == model))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PilotError::openai(format!(
                "Failed to list models ({})",
                response.status()
            )));
        }

        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key() {
        let mut config = Config::default();
        config.openai.api_key = None;
        assert!(matches!(
            OpenAiClient::from_config(&config),
            Err(PilotError::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_json_mode_request() {
        let messages = vec![Message::system("rules"), Message::user("page")];
        let request =
            OpenAiClient::build_request("gpt-4o", &messages, Some(GenerateOptions::json(0.2)));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][1]["content"], "page");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_response() {
        let response: ChatResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o",
                "choices": [{"message": {"role": "assistant", "content": "{\"action\":{}}"}}],
                "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
            }"#,
        )
        .unwrap();
        let llm = OpenAiClient::to_llm_response(response).unwrap();
        assert_eq!(llm.content, r#"{"action":{}}"#);
        assert_eq!(llm.usage.map(|u| u.total_tokens), Some(120));
    }

    #[test]
    fn test_empty_choices_is_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(OpenAiClient::to_llm_response(response).is_err());
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        assert_eq!(OpenAiClient::error_message(body), "Invalid API key");
        assert_eq!(OpenAiClient::error_message("bad gateway"), "bad gateway");
    }
}
