// LanceDB vector store
// Persists embeddings + document text + metadata for similarity search

#[cfg(test)]
mod tests;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DocumentMetadata, EmbeddingRecord};
use crate::{RagError, Result};

const TABLE_NAME: &str = "documents";

/// Pointer file in the index root naming the committed version directory.
const CURRENT_POINTER: &str = "CURRENT";

/// Version name used before any index has been committed.
const INITIAL_VERSION: &str = "v-empty";

/// Persisted nearest-neighbor index over document embeddings. The index root
/// holds one LanceDB dataset per version plus a pointer file naming the
/// committed one; a handle stays pinned to the version it opened, so readers
/// are unaffected by a rebuild until they reopen.
pub struct VectorStore {
    root: PathBuf,
    version: String,
    connection: Connection,
    table_name: String,
}

/// One retrieval hit: stored document plus similarity to the query vector.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub metadata: DocumentMetadata,
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Open the index at `index_dir`, pinned to the committed version (or to
    /// an empty placeholder when nothing has been built yet).
    #[inline]
    pub async fn open(index_dir: &Path) -> Result<Self> {
        let version =
            read_current_version(index_dir).unwrap_or_else(|| INITIAL_VERSION.to_string());
        debug!(
            "Opening LanceDB index at {} (version {})",
            index_dir.display(),
            version
        );

        let connection = connect_to_version(index_dir, &version).await?;

        Ok(Self {
            root: index_dir.to_path_buf(),
            version,
            connection,
            table_name: TABLE_NAME.to_string(),
        })
    }

    /// Replace the entire index with `records`. The new index is written into
    /// a fresh version directory and the pointer file is flipped only after
    /// the insert completes, so handles opened earlier keep answering from
    /// the version they opened. The previously committed version stays on
    /// disk until the next rebuild; there is no incremental update path and
    /// rebuilds are idempotent.
    #[inline]
    pub async fn rebuild(&mut self, records: Vec<EmbeddingRecord>) -> Result<()> {
        if records.is_empty() {
            return Err(RagError::Index(
                "Refusing to persist an empty index".to_string(),
            ));
        }

        let vector_dim = records[0].vector.len();
        if records.iter().any(|r| r.vector.len() != vector_dim) {
            return Err(RagError::Index(
                "All embedding vectors must share one dimension".to_string(),
            ));
        }

        // Versions older than the committed one have no readers left
        let live_version =
            read_current_version(&self.root).unwrap_or_else(|| self.version.clone());
        prune_stale_versions(&self.root, &live_version);

        let version = format!("v-{}", Uuid::new_v4().simple());
        let connection = connect_to_version(&self.root, &version).await?;

        let schema = create_schema(vector_dim);
        connection
            .create_empty_table(&self.table_name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to create table: {}", e)))?;

        let record_batch = create_record_batch(&records, vector_dim, &schema)?;
        let table = connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to open table: {}", e)))?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to insert embeddings: {}", e)))?;

        commit_current_version(&self.root, &version)?;
        self.version = version;
        self.connection = connection;

        info!(
            "Persisted index with {} documents ({} dimensions)",
            records.len(),
            vector_dim
        );
        Ok(())
    }

    /// Nearest-neighbor search. Returns at most `k` results ordered by
    /// descending similarity; fewer when the index holds fewer documents.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching for {} nearest documents", k);

        let stored_dim = self.vector_dimension().await?;
        if query_vector.len() != stored_dim {
            return Err(RagError::Index(format!(
                "Embedding dimension mismatch: query has {} dimensions but the index \
                 was built with {}. Rebuild the index with the current embedding model.",
                query_vector.len(),
                stored_dim
            )));
        }

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Index(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to execute search: {}", e)))?;

        let mut search_results = Vec::new();
        let mut stream = results;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Index(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(parse_search_batch(&batch)?);
        }

        debug!("Retrieved {} documents", search_results.len());
        Ok(search_results)
    }

    /// Number of documents in the persisted index.
    #[inline]
    pub async fn count_documents(&self) -> Result<u64> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Index(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }

    /// Dimension of the stored vectors, read from the table schema.
    #[inline]
    pub async fn vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Index(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Index(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&self.table_name) {
            return Err(RagError::Index(
                "Index has not been built yet; run the index command first".to_string(),
            ));
        }

        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to open table: {}", e)))
    }
}

async fn connect_to_version(root: &Path, version: &str) -> Result<Connection> {
    let dataset_dir = root.join(version);
    std::fs::create_dir_all(&dataset_dir)
        .map_err(|e| RagError::Index(format!("Failed to create index directory: {}", e)))?;

    let uri = format!("file://{}", dataset_dir.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| RagError::Index(format!("Failed to connect to LanceDB: {}", e)))
}

fn read_current_version(root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(root.join(CURRENT_POINTER)).ok()?;
    let version = raw.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Write-then-rename so the pointer file is never observed half-written.
fn commit_current_version(root: &Path, version: &str) -> Result<()> {
    let staged = root.join(format!("{CURRENT_POINTER}.tmp"));
    std::fs::write(&staged, version)
        .map_err(|e| RagError::Index(format!("Failed to stage index pointer: {}", e)))?;
    std::fs::rename(&staged, root.join(CURRENT_POINTER))
        .map_err(|e| RagError::Index(format!("Failed to commit index pointer: {}", e)))
}

fn prune_stale_versions(root: &Path, keep: &str) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && entry.file_name().to_str() != Some(keep) {
            debug!("Removing stale index version {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to remove stale index version {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("doc_type", DataType::Utf8, false),
        Field::new("priority", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(
    records: &[EmbeddingRecord],
    vector_dim: usize,
    schema: &Arc<Schema>,
) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut doc_types = Vec::with_capacity(len);
    let mut priorities = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);

    for record in records {
        ids.push(record.id.as_str());
        contents.push(record.metadata.content.as_str());
        doc_types.push(record.metadata.doc_type.as_str());
        priorities.push(record.metadata.priority.as_str());
        sources.push(record.metadata.source.as_str());
        chunk_indices.push(record.metadata.chunk_index);
        created_ats.push(record.metadata.created_at.as_str());
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| RagError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(doc_types)),
        Arc::new(StringArray::from(priorities)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(Arc::clone(schema), arrays)
        .map_err(|e| RagError::Index(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Index(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Index(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let contents = string_column(batch, "content")?;
    let doc_types = string_column(batch, "doc_type")?;
    let priorities = string_column(batch, "priority")?;
    let sources = string_column(batch, "source")?;
    let created_ats = string_column(batch, "created_at")?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .ok_or_else(|| RagError::Index("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Index("Invalid chunk_index column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut search_results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let metadata = DocumentMetadata {
            content: contents.value(row).to_string(),
            doc_type: doc_types.value(row).to_string(),
            priority: priorities.value(row).to_string(),
            source: sources.value(row).to_string(),
            chunk_index: chunk_indices.value(row),
            created_at: created_ats.value(row).to_string(),
        };

        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        // Convert distance to similarity score (higher is better)
        search_results.push(SearchResult {
            metadata,
            similarity_score: 1.0 - distance,
            distance,
        });
    }

    Ok(search_results)
}
