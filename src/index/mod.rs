// Vector index module
// Owns the persisted association between embedding vectors and documents


pub mod vector_store;

pub use vector_store::{SearchResult, VectorStore};

use tracing::info;
use uuid::Uuid;

use crate::embeddings::OllamaClient;
use crate::synthesis::Document;
use crate::{RagError, Result};

/// One embedding plus the document it was derived from. No vector exists
/// without a backing document.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// Document text and provenance stored alongside its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub content: String,
    pub doc_type: String,
    pub priority: String,
    pub source: String,
    pub chunk_index: u32,
    pub created_at: String,
}

impl EmbeddingRecord {
    /// Pair a synthesized document with its embedding vector.
    #[inline]
    pub fn from_document(document: &Document, vector: Vec<f32>) -> Self {
        let get = |key: &str, default: &str| {
            document
                .metadata
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: DocumentMetadata {
                content: document.text.clone(),
                doc_type: get("type", "detail"),
                priority: get("priority", "normal"),
                source: get("source", ""),
                chunk_index: document
                    .metadata
                    .get("chunk")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Embed every document and replace the persisted index wholesale.
///
/// Zero documents is a deployment-blocking error (an empty index would
/// silently answer every query with no context), and any embedding failure
/// aborts the whole build so a partial index is never persisted.
#[inline]
pub async fn build_index(
    documents: &[Document],
    embedder: &OllamaClient,
    store: &mut VectorStore,
) -> Result<usize> {
    if documents.is_empty() {
        return Err(RagError::Dataset(
            "No documents to index; check that the dataset contains the required \
             tables (Ventas, Productos, Clientes) or switch to row mode"
                .to_string(),
        ));
    }

    let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
    let embedder = embedder.clone();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| RagError::Embedding(format!("Embedding task panicked: {e}")))?
        .map_err(|e| RagError::Embedding(format!("Index build aborted: {e:#}")))?;

    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
        return Err(RagError::Embedding(
            "Embedding service returned vectors of inconsistent dimension".to_string(),
        ));
    }

    let records: Vec<EmbeddingRecord> = documents
        .iter()
        .zip(vectors)
        .map(|(document, vector)| EmbeddingRecord::from_document(document, vector))
        .collect();

    store.rebuild(records).await?;

    info!(
        "Indexed {} documents with {}-dimensional embeddings",
        documents.len(),
        dimension
    );
    Ok(documents.len())
}
