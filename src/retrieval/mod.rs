// Retrieval module
// Embeds a query and returns the k most similar indexed documents

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::index::{SearchResult, VectorStore};
use crate::{RagError, Result};

/// One retrieved document with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub text: String,
    pub source: String,
    pub doc_type: String,
    pub similarity: f32,
}

impl From<SearchResult> for RetrievedDocument {
    #[inline]
    fn from(result: SearchResult) -> Self {
        Self {
            text: result.metadata.content,
            source: result.metadata.source,
            doc_type: result.metadata.doc_type,
            similarity: result.similarity_score,
        }
    }
}

/// Read-only view over the persisted index. Queries embed with the same
/// model that built the index; the store rejects dimension mismatches.
pub struct Retriever {
    store: Arc<VectorStore>,
    embedder: OllamaClient,
    k: usize,
}

impl Retriever {
    #[inline]
    pub fn new(store: Arc<VectorStore>, embedder: OllamaClient, k: usize) -> Self {
        Self {
            store,
            embedder,
            k: k.max(1),
        }
    }

    /// Open the persisted index from configuration.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let store = VectorStore::open(&config.index_dir()).await?;
        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Embedding(format!("Failed to create embedding client: {e:#}")))?;
        Ok(Self::new(
            Arc::new(store),
            embedder,
            config.retrieval.effective_k(),
        ))
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Return up to k documents ordered by descending similarity.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        debug!("Retrieving top {} documents for query", self.k);

        let embedder = self.embedder.clone();
        let query_owned = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&query_owned))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task panicked: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("Failed to embed query: {e:#}")))?;

        let results = self.store.search(&vector, self.k).await?;
        Ok(results.into_iter().map(RetrievedDocument::from).collect())
    }
}
