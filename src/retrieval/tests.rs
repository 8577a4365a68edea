use super::*;
use crate::index::DocumentMetadata;

#[test]
fn search_result_conversion() {
    let result = SearchResult {
        metadata: DocumentMetadata {
            content: "Ingresos totales: $70.00".to_string(),
            doc_type: "complete".to_string(),
            priority: "highest".to_string(),
            source: "resumen-ventas".to_string(),
            chunk_index: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
        similarity_score: 0.93,
        distance: 0.07,
    };

    let doc = RetrievedDocument::from(result);
    assert_eq!(doc.text, "Ingresos totales: $70.00");
    assert_eq!(doc.source, "resumen-ventas");
    assert_eq!(doc.doc_type, "complete");
    assert!((doc.similarity - 0.93).abs() < f32::EPSILON);
}

#[tokio::test]
async fn retriever_clamps_k_to_at_least_one() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let store = VectorStore::open(dir.path()).await.expect("open store");
    let embedder =
        OllamaClient::new(&crate::config::OllamaConfig::default()).expect("embedder client");

    let retriever = Retriever::new(Arc::new(store), embedder, 0);
    assert_eq!(retriever.k(), 1);
}
