// Configuration management module
// Handles TOML configuration management and settings

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, GenerationProvider, OllamaConfig, OpenAiConfig, RetrievalConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::DirectoryError)?
        .join("retail-rag");
    Ok(dir)
}
