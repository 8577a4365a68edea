use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, GenerationProvider, OllamaConfig};
use crate::embeddings::OllamaClient;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("Retail RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = Config::load_default().unwrap_or_else(|_| {
        let mut defaults = Config::default();
        if let Ok(dir) = crate::config::get_config_dir() {
            defaults.base_dir = dir;
        }
        defaults
    });
    if config.base_dir.as_os_str().is_empty() {
        config.base_dir = crate::config::get_config_dir()?;
    }

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embedding generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Generation Backend").bold().yellow());
    let providers = ["ollama (local model server)", "openai (hosted API)"];
    let current = match config.generation.provider {
        GenerationProvider::Ollama => 0,
        GenerationProvider::OpenAi => 1,
    };
    let selection = Select::new()
        .with_prompt("Which backend should answer questions?")
        .items(&providers)
        .default(current)
        .interact()?;
    config.generation.provider = if selection == 0 {
        GenerationProvider::Ollama
    } else {
        GenerationProvider::OpenAi
    };

    if config.generation.provider == GenerationProvider::OpenAi {
        config.openai.model = Input::new()
            .with_prompt("OpenAI model")
            .default(config.openai.model.clone())
            .interact_text()?;
        let api_key: String = Input::new()
            .with_prompt("OpenAI API key (leave empty to use OPENAI_API_KEY)")
            .allow_empty(true)
            .interact_text()?;
        config.openai.api_key = if api_key.trim().is_empty() {
            None
        } else {
            Some(api_key)
        };
    }

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before indexing.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    ollama.host = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .interact_text()?;

    ollama.port = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .interact_text()?;

    ollama.embedding_model = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .interact_text()?;

    ollama.generation_model = Input::new()
        .with_prompt("Generation model")
        .default(ollama.generation_model.clone())
        .interact_text()?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    OllamaClient::new(ollama)
        .map(|client| client.ping().is_ok())
        .unwrap_or(false)
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    println!("Config file: {}", config.config_file_path().display());
    println!("Index directory: {}", config.index_dir().display());
    match &config.dataset_path {
        Some(path) => println!("Dataset path: {}", path.display()),
        None => println!("Dataset path: (auto-discover *.xlsx in working directory)"),
    }
    println!();
    println!("{}", style("Ollama").bold());
    println!(
        "  Server: {}://{}:{}",
        config.ollama.protocol, config.ollama.host, config.ollama.port
    );
    println!("  Embedding model: {}", config.ollama.embedding_model);
    println!("  Generation model: {}", config.ollama.generation_model);
    println!("  Batch size: {}", config.ollama.batch_size);
    println!();
    println!("{}", style("Generation").bold());
    println!("  Provider: {}", config.generation.provider);
    if config.generation.provider == GenerationProvider::OpenAi {
        println!("  OpenAI model: {}", config.openai.model);
        println!(
            "  OpenAI credential: {}",
            if config.openai_api_key().is_some() {
                "configured"
            } else {
                "missing"
            }
        );
    }
    println!();
    println!("{}", style("Retrieval").bold());
    println!("  Mode: {:?}", config.retrieval.mode);
    println!("  k: {}", config.retrieval.effective_k());
    println!("  Row chunk size: {} chars", config.retrieval.chunk_size);
    println!("  Greetings: {}", config.greetings.join(", "));

    Ok(())
}
