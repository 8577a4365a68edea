// RAG orchestration module
// Wires retrieval, prompt composition and generation into one query path


pub mod greeting;
pub mod prompt;

pub use greeting::is_greeting;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::dataset::{Workbook, resolve_dataset_path};
use crate::embeddings::OllamaClient;
use crate::generation::{Generator, build_generator};
use crate::index::{VectorStore, build_index};
use crate::retrieval::{RetrievedDocument, Retriever};
use crate::synthesis::synthesize;
use crate::{RagError, Result};

/// Canned reply for conversational openers; retrieval and generation are
/// bypassed entirely.
pub const GREETING_REPLY: &str = "¡Hola! Soy tu asistente de análisis de ventas. \
    Puedes preguntarme cosas como \"¿Cuántas ventas hubo en 2023?\" \
    o \"¿Cuál es el producto más vendido?\"";

/// Maximum context characters echoed back by the degraded answer.
const DEGRADED_CONTEXT_LIMIT: usize = 1000;

/// Response value returned per query.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

/// Outcome of one query, with the degraded path visible in the type rather
/// than hidden behind exception control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The query was a greeting; no retrieval happened.
    Greeting(Answer),
    /// The backend produced a grounded answer.
    Answered(Answer),
    /// The backend failed; the answer embeds a truncated context prefix.
    Degraded(Answer),
}

impl QueryOutcome {
    #[inline]
    pub fn into_answer(self) -> Answer {
        match self {
            QueryOutcome::Greeting(answer)
            | QueryOutcome::Answered(answer)
            | QueryOutcome::Degraded(answer) => answer,
        }
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        matches!(self, QueryOutcome::Degraded(_))
    }
}

/// Result of a full reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub documents_indexed: usize,
}

/// The query-serving pipeline. Constructed once at startup (load index →
/// retriever → generator → orchestrator); the retriever handle is swapped
/// atomically after a rebuild so in-flight queries keep their snapshot.
pub struct RagPipeline {
    config: Config,
    generator: Arc<dyn Generator>,
    retriever: RwLock<Arc<Retriever>>,
    rebuild_guard: Mutex<()>,
}

impl RagPipeline {
    /// Build the pipeline from configuration. Fails fast on invalid backend
    /// selection; the index itself may not exist yet (queries will report
    /// that explicitly until `rebuild` runs).
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let generator: Arc<dyn Generator> = build_generator(&config)?.into();
        let retriever = Arc::new(Retriever::open(&config).await?);

        info!(
            "Pipeline initialized (generation backend: {}, k: {})",
            generator.name(),
            retriever.k()
        );

        Ok(Self {
            config,
            generator,
            retriever: RwLock::new(retriever),
            rebuild_guard: Mutex::new(()),
        })
    }

    /// Answer a free-text query. Greetings short-circuit; otherwise the
    /// retrieved context grounds the generation backend, and backend failure
    /// degrades to a context echo instead of propagating.
    #[inline]
    pub async fn query(&self, question: &str) -> Result<QueryOutcome> {
        if is_greeting(question, &self.config.greetings) {
            return Ok(QueryOutcome::Greeting(Answer {
                text: GREETING_REPLY.to_string(),
                sources: Vec::new(),
            }));
        }

        let retriever = Arc::clone(&*self.retriever.read().await);
        let documents = retriever.retrieve(question).await?;
        let context = join_context(&documents);

        let prompt = prompt::compose(&context, question);

        // Blocking HTTP call; keep it off the async workers
        let generator = Arc::clone(&self.generator);
        let generation = tokio::task::spawn_blocking(move || generator.complete(&prompt))
            .await
            .map_err(|e| RagError::Generation(format!("Generation task panicked: {e}")))?;

        match generation {
            Ok(text) => Ok(QueryOutcome::Answered(Answer {
                sources: collect_sources(&documents),
                text,
            })),
            Err(e) => {
                warn!(
                    "Generation backend '{}' failed, degrading to context echo: {e:#}",
                    self.generator.name()
                );
                Ok(QueryOutcome::Degraded(Answer {
                    text: degraded_text(&context),
                    sources: Vec::new(),
                }))
            }
        }
    }

    /// Convenience wrapper returning the plain answer value.
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        Ok(self.query(question).await?.into_answer())
    }

    /// Re-extract, re-synthesize, re-embed and re-persist the index, then
    /// swap the in-memory retriever. At most one rebuild runs at a time.
    #[inline]
    pub async fn rebuild(&self, dataset_override: Option<&Path>) -> Result<RebuildReport> {
        let _guard = self
            .rebuild_guard
            .try_lock()
            .map_err(|_| RagError::Index("A rebuild is already in progress".to_string()))?;

        let documents_indexed = rebuild_index(&self.config, dataset_override).await?;

        // Swap only after the new index is fully persisted
        let retriever = Arc::new(Retriever::open(&self.config).await?);
        *self.retriever.write().await = retriever;

        Ok(RebuildReport { documents_indexed })
    }
}

/// Run the offline indexing path: extract → synthesize → embed → persist.
#[inline]
pub async fn rebuild_index(config: &Config, dataset_override: Option<&Path>) -> Result<usize> {
    let current_dir = std::env::current_dir()?;
    let dataset_path = resolve_dataset_path(
        dataset_override.or(config.dataset_path.as_deref()),
        &current_dir,
    )?;

    let workbook = Workbook::read(&dataset_path)?;
    let documents = synthesize(
        &workbook,
        config.retrieval.mode,
        config.retrieval.chunk_size,
    );

    let embedder = OllamaClient::new(&config.ollama)
        .map_err(|e| RagError::Embedding(format!("Failed to create embedding client: {e:#}")))?;
    let mut store = VectorStore::open(&config.index_dir()).await?;

    build_index(&documents, &embedder, &mut store).await
}

/// Concatenate retrieved texts, in ranked order, separated by blank lines.
fn join_context(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Provenance labels of the retrieved documents, deduplicated in rank order.
fn collect_sources(documents: &[RetrievedDocument]) -> Vec<String> {
    let mut sources = Vec::new();
    for document in documents {
        if !document.source.is_empty() && !sources.contains(&document.source) {
            sources.push(document.source.clone());
        }
    }
    sources
}

/// Best-effort fallback answer embedding a bounded prefix of the context.
fn degraded_text(context: &str) -> String {
    let prefix: String = context.chars().take(DEGRADED_CONTEXT_LIMIT).collect();
    format!(
        "Basándome en los datos disponibles, encontré la siguiente información relevante:\n\n{}...",
        prefix
    )
}
