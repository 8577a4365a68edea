use super::*;
use crate::config::{Config, OllamaConfig, OpenAiConfig};

#[test]
fn ollama_provider_selected_by_default() {
    let config = Config::default();
    let generator = build_generator(&config).expect("ollama generator needs no credential");
    assert_eq!(generator.name(), "ollama");
}

#[test]
fn openai_provider_requires_credential() {
    let mut config = Config::default();
    config.generation.provider = GenerationProvider::OpenAi;
    config.openai.api_key = None;

    // Only meaningful when the environment does not provide a key
    if std::env::var("OPENAI_API_KEY").is_err() {
        let result = build_generator(&config);
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    config.openai.api_key = Some("sk-test".to_string());
    let generator = build_generator(&config).expect("generator with explicit key");
    assert_eq!(generator.name(), "openai");
}

#[test]
fn generator_construction_from_configs() {
    let ollama = OllamaGenerator::new(&OllamaConfig::default()).expect("ollama generator");
    assert_eq!(ollama.name(), "ollama");

    let openai = OpenAiGenerator::new(&OpenAiConfig::default(), "sk-test".to_string())
        .expect("openai generator");
    assert_eq!(openai.name(), "openai");
}
