//! Client for an OpenAI-compatible chat-completions service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("inference API error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

/// Connection settings for the inference service.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl InferenceConfig {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("INFERENCE_API_KEY").ok()?;
        let base_url = std::env::var("INFERENCE_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("INFERENCE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Thin chat-completions client; one exchange per call, no streaming.
pub struct InferenceClient {
    client: reqwest::Client,
    config: InferenceConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// One system+user exchange; returns the assistant's text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api(text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InferenceError::Parse("no choices in response".to_string()))
    }

    /// Like `complete`, but the reply must be a JSON object. Models wrap
    /// JSON in code fences often enough that we strip them.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
    ) -> Result<serde_json::Value, InferenceError> {
        let text = self.complete(system, user).await?;
        let trimmed = strip_code_fence(&text);
        serde_json::from_str(trimmed).map_err(|e| InferenceError::Parse(e.to_string()))
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }
}
