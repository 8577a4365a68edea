use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(PathBuf),

    #[error("Dataset format error: {0}")]
    DatasetFormat(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod dataset;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod retrieval;
pub mod synthesis;
