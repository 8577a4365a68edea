// Generation module
// One adapter per backend behind a single Generator interface, selected once
// at construction time from configuration

#[cfg(test)]
mod tests;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

use crate::config::{Config, GenerationProvider};
use crate::{RagError, Result};

/// A text-completion backend. Implementations must bound their own request
/// timeouts so a hung backend cannot stall the caller indefinitely.
pub trait Generator: Send + Sync {
    /// Complete the grounding prompt into an answer.
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;

    /// Backend label for logging and status output.
    fn name(&self) -> &'static str;
}

/// Select and construct the configured generation backend. Invalid or
/// incomplete backend configuration is a startup error.
#[inline]
pub fn build_generator(config: &Config) -> Result<Box<dyn Generator>> {
    match config.generation.provider {
        GenerationProvider::Ollama => {
            let generator = OllamaGenerator::new(&config.ollama).map_err(|e| {
                RagError::Config(format!("Failed to configure Ollama generator: {e:#}"))
            })?;
            Ok(Box::new(generator))
        }
        GenerationProvider::OpenAi => {
            let api_key = config.openai_api_key().ok_or_else(|| {
                RagError::Config(
                    "Generation provider is 'openai' but no API key is configured \
                     (set openai.api_key or the OPENAI_API_KEY environment variable)"
                        .to_string(),
                )
            })?;
            let generator = OpenAiGenerator::new(&config.openai, api_key).map_err(|e| {
                RagError::Config(format!("Failed to configure OpenAI generator: {e:#}"))
            })?;
            Ok(Box::new(generator))
        }
    }
}
