use super::*;
use tempfile::TempDir;

fn record(id: &str, vector: Vec<f32>, content: &str, source: &str) -> EmbeddingRecord {
    EmbeddingRecord {
        id: id.to_string(),
        vector,
        metadata: DocumentMetadata {
            content: content.to_string(),
            doc_type: "detail".to_string(),
            priority: "normal".to_string(),
            source: source.to_string(),
            chunk_index: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[test]
fn schema_has_fixed_size_vector_column() {
    let schema = create_schema(4);
    let field = schema.field_with_name("vector").expect("vector field");
    assert!(matches!(field.data_type(), DataType::FixedSizeList(_, 4)));
    assert!(schema.field_with_name("content").is_ok());
    assert!(schema.field_with_name("source").is_ok());
}

#[test]
fn record_batch_roundtrip() {
    let records = vec![
        record("a", vec![1.0, 0.0], "doc a", "Ventas:1"),
        record("b", vec![0.0, 1.0], "doc b", "Ventas:2"),
    ];
    let schema = create_schema(2);
    let batch = create_record_batch(&records, 2, &schema).expect("batch");
    assert_eq!(batch.num_rows(), 2);

    // Without a _distance column, similarity defaults to 1.0
    let parsed = parse_search_batch(&batch).expect("parse");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].metadata.content, "doc a");
    assert_eq!(parsed[1].metadata.source, "Ventas:2");
    assert!((parsed[0].similarity_score - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn mismatched_vector_dimensions_rejected() {
    let records = vec![
        record("a", vec![1.0, 0.0], "doc a", "Ventas:1"),
        record("b", vec![0.0], "doc b", "Ventas:2"),
    ];

    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::open(dir.path()).await.expect("open store");
    let result = store.rebuild(records).await;
    assert!(matches!(result, Err(RagError::Index(_))));
}

#[tokio::test]
async fn rebuild_search_and_count() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::open(dir.path()).await.expect("open store");

    let records = vec![
        record("a", vec![1.0, 0.0, 0.0], "primer documento", "Ventas:1"),
        record("b", vec![0.0, 1.0, 0.0], "segundo documento", "Ventas:2"),
    ];
    store.rebuild(records).await.expect("rebuild");

    assert_eq!(store.count_documents().await.expect("count"), 2);
    assert_eq!(store.vector_dimension().await.expect("dimension"), 3);

    let results = store.search(&[1.0, 0.1, 0.0], 1).await.expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.content, "primer documento");

    // k larger than the index returns everything, not an error
    let results = store.search(&[1.0, 0.1, 0.0], 10).await.expect("search");
    assert_eq!(results.len(), 2);

    // Order is stable across identical queries
    let again = store.search(&[1.0, 0.1, 0.0], 10).await.expect("search");
    let sources: Vec<_> = results.iter().map(|r| r.metadata.source.clone()).collect();
    let sources_again: Vec<_> = again.iter().map(|r| r.metadata.source.clone()).collect();
    assert_eq!(sources, sources_again);
}

#[tokio::test]
async fn rebuild_replaces_previous_index() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::open(dir.path()).await.expect("open store");

    store
        .rebuild(vec![record("a", vec![1.0, 0.0], "viejo", "Ventas:1")])
        .await
        .expect("first rebuild");
    store
        .rebuild(vec![
            record("b", vec![0.0, 1.0], "nuevo", "Ventas:1"),
            record("c", vec![1.0, 1.0], "nuevo 2", "Ventas:2"),
        ])
        .await
        .expect("second rebuild");

    assert_eq!(store.count_documents().await.expect("count"), 2);
    let results = store.search(&[0.0, 1.0], 10).await.expect("search");
    assert!(results.iter().all(|r| r.metadata.content.starts_with("nuevo")));
}

#[tokio::test]
async fn handles_opened_before_a_rebuild_keep_their_snapshot() {
    let dir = TempDir::new().expect("tempdir");

    let mut writer = VectorStore::open(dir.path()).await.expect("open writer");
    writer
        .rebuild(vec![record("a", vec![1.0, 0.0], "viejo", "Ventas:1")])
        .await
        .expect("first rebuild");

    // A reader opened now pins the committed version
    let reader = VectorStore::open(dir.path()).await.expect("open reader");

    let mut second_writer = VectorStore::open(dir.path()).await.expect("open second writer");
    second_writer
        .rebuild(vec![
            record("b", vec![0.0, 1.0], "nuevo", "Ventas:1"),
            record("c", vec![1.0, 1.0], "nuevo 2", "Ventas:2"),
        ])
        .await
        .expect("second rebuild");

    // The reader still answers from the version it opened
    assert_eq!(reader.count_documents().await.expect("count"), 1);
    let results = reader.search(&[1.0, 0.0], 10).await.expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.content, "viejo");

    // A handle opened after the rebuild sees the replacement
    let fresh = VectorStore::open(dir.path()).await.expect("open fresh");
    assert_eq!(fresh.count_documents().await.expect("count"), 2);
    let results = fresh.search(&[0.0, 1.0], 10).await.expect("search");
    assert!(results.iter().all(|r| r.metadata.content.starts_with("nuevo")));
}

#[tokio::test]
async fn dimension_mismatch_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::open(dir.path()).await.expect("open store");
    store
        .rebuild(vec![record("a", vec![1.0, 0.0, 0.0], "doc", "Ventas:1")])
        .await
        .expect("rebuild");

    let result = store.search(&[1.0, 0.0], 1).await;
    match result {
        Err(RagError::Index(message)) => {
            assert!(message.contains("dimension mismatch"), "message: {message}");
        }
        other => panic!("expected dimension mismatch error, got {:?}", other.map(|r| r.len())),
    }
}

#[tokio::test]
async fn search_before_build_is_an_explicit_error() {
    let dir = TempDir::new().expect("tempdir");
    let store = VectorStore::open(dir.path()).await.expect("open store");

    let result = store.search(&[1.0, 0.0], 1).await;
    match result {
        Err(RagError::Index(message)) => {
            assert!(message.contains("not been built"), "message: {message}");
        }
        other => panic!("expected index-missing error, got {:?}", other.map(|r| r.len())),
    }
}
