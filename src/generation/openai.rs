
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::Generator;
use crate::config::OpenAiConfig;

const GENERATION_TIMEOUT_SECONDS: u64 = 60;

/// Remote hosted API requiring a bearer credential.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    base_url: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiGenerator {
    #[inline]
    pub fn new(config: &OpenAiConfig, api_key: String) -> Result<Self> {
        let base_url = Url::parse(&config.api_base)
            .with_context(|| format!("Invalid OpenAI API base URL: {}", config.api_base))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(GENERATION_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key,
            agent,
        })
    }
}

impl Generator for OpenAiGenerator {
    #[inline]
    fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from OpenAI model {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
        };

        let url = self
            .base_url
            .join("/v1/chat/completions")
            .context("Failed to build chat completions URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("OpenAI chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("Chat response contained no choices")
    }

    #[inline]
    fn name(&self) -> &'static str {
        "openai"
    }
}
