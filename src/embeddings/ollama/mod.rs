#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Client for the Ollama embedding endpoint. The embedding model identity is
/// pinned by configuration and must match between index build and query time.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.embedding_model.clone(),
            batch_size: config.batch_size,
            agent: agent_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent_with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// The embedding model this client is pinned to.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the server is reachable and the configured model exists.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.ping().context("Server ping failed")?;
        self.validate_model().context("Model validation failed")?;

        info!(
            "Ollama server at {} is healthy (model {})",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Cheap reachability probe against the model listing endpoint.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let _: ModelsResponse = self
            .get_json("/api/tags")
            .context("Failed to ping Ollama server")?;
        Ok(())
    }

    /// Verify the configured embedding model is installed on the server.
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;
        if models.iter().any(|m| m.name == self.model) {
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!(
            "Model {} not found. Available models: {:?}",
            self.model, available
        );
        Err(anyhow::anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            self.model,
            available
        ))
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response: ModelsResponse = self
            .get_json("/api/tags")
            .context("Failed to fetch models")?;
        Ok(response.models)
    }

    /// Embed a single text.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response: EmbedResponse = self
            .post_json("/api/embed", &request)
            .context("Failed to generate embedding")?;

        debug!(
            "Generated embedding with {} dimensions",
            response.embedding.len()
        );
        Ok(response.embedding)
    }

    /// Embed many texts, batching requests by the configured batch size.
    /// The output order matches the input order.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size as usize) {
            let vectors = self
                .embed_chunk(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(vectors);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // The batch endpoint shape differs for one text; use the single API
        if let [text] = texts {
            return Ok(vec![self.embed(text)?]);
        }

        let request = BatchEmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };

        let response: BatchEmbedResponse = self
            .post_json("/api/embed", &request)
            .context("Failed to generate batch embeddings")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    fn get_json<R: DeserializeOwned>(&self, api_path: &str) -> Result<R> {
        let url = self
            .base_url
            .join(api_path)
            .with_context(|| format!("Failed to build URL for {api_path}"))?;

        let body = self.request_with_retry(|| self.agent.get(url.as_str()).call())?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse {api_path} response"))
    }

    fn post_json<T: Serialize, R: DeserializeOwned>(&self, api_path: &str, payload: &T) -> Result<R> {
        let url = self
            .base_url
            .join(api_path)
            .with_context(|| format!("Failed to build URL for {api_path}"))?;
        let json =
            serde_json::to_string(payload).context("Failed to serialize request payload")?;

        let body = self.request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&json)
        })?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse {api_path} response"))
    }

    /// Run a request, retrying transport errors and 5xx responses with
    /// exponential backoff. 4xx responses fail immediately.
    fn request_with_retry<F>(&self, mut send: F) -> Result<String>
    where
        F: FnMut() -> Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let error = match send().and_then(|mut resp| resp.body_mut().read_to_string()) {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            let retryable = match &error {
                ureq::Error::StatusCode(status) if *status >= 500 => true,
                ureq::Error::StatusCode(status) => {
                    return Err(anyhow::anyhow!("Client error: HTTP {status}"));
                }
                ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_) => true,
                _ => false,
            };

            if !retryable {
                return Err(anyhow::anyhow!("Non-retryable error: {error}"));
            }
            if attempt >= self.retry_attempts {
                warn!(
                    "Request to {} failed after {} attempts: {}",
                    self.base_url, attempt, error
                );
                return Err(anyhow::anyhow!(
                    "Request failed after {attempt} attempts: {error}"
                ));
            }

            let delay = Duration::from_millis(1000u64 << (attempt - 1));
            warn!(
                "Retryable error ({}), waiting {:?} before attempt {}",
                error,
                delay,
                attempt + 1
            );
            std::thread::sleep(delay);
        }
    }
}
