// Embeddings module
// Handles Ollama integration for turning document text into vectors

pub mod ollama;

pub use ollama::OllamaClient;
