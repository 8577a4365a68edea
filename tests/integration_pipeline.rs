#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use retail_rag::config::{Config, GenerationProvider};
use retail_rag::dataset::{CellValue, Table, Workbook};
use retail_rag::embeddings::OllamaClient;
use retail_rag::index::{VectorStore, build_index};
use retail_rag::pipeline::{GREETING_REPLY, QueryOutcome, RagPipeline};
use retail_rag::synthesis::{SynthesisMode, synthesize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches embedding requests whose JSON body carries the given key, telling
/// the single-text shape (`prompt`) apart from the batch shape (`input`).
struct BodyHasKey(&'static str);

impl Match for BodyHasKey {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<serde_json::Value>(&request.body)
            .map(|body| body.get(self.0).is_some())
            .unwrap_or(false)
    }
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn int(i: i64) -> CellValue {
    CellValue::Int(i)
}

/// Two transactions across two years, joined over three sheets.
fn sample_workbook() -> Workbook {
    let mut workbook = Workbook::default();

    workbook.tables.insert(
        "Ventas".to_string(),
        Table {
            name: "Ventas".to_string(),
            columns: vec![
                "IdVenta".to_string(),
                "IdProducto".to_string(),
                "IdCliente".to_string(),
                "Cantidad".to_string(),
                "Precio".to_string(),
                "FechaVenta".to_string(),
            ],
            rows: vec![
                vec![
                    int(1),
                    int(1),
                    int(1),
                    int(2),
                    CellValue::Float(10.0),
                    text("2023-05-01"),
                ],
                vec![
                    int(2),
                    int(2),
                    int(2),
                    int(1),
                    CellValue::Float(50.0),
                    text("2024-01-10"),
                ],
            ],
        },
    );

    workbook.tables.insert(
        "Productos".to_string(),
        Table {
            name: "Productos".to_string(),
            columns: vec![
                "IdProducto".to_string(),
                "NombreProducto".to_string(),
                "Categoria".to_string(),
            ],
            rows: vec![
                vec![int(1), text("Monitor"), text("Electrónica")],
                vec![int(2), text("Silla"), text("Muebles")],
            ],
        },
    );

    workbook.tables.insert(
        "Clientes".to_string(),
        Table {
            name: "Clientes".to_string(),
            columns: vec![
                "IdCliente".to_string(),
                "NombreCliente".to_string(),
                "Ciudad".to_string(),
            ],
            rows: vec![
                vec![int(1), text("Ana"), text("Montevideo")],
                vec![int(2), text("Bruno"), text("Salto")],
            ],
        },
    );

    workbook
}

fn test_config(server: &MockServer, index_dir: &TempDir, mode: SynthesisMode) -> Config {
    let mut config = Config::default();
    config.ollama.host = server.address().ip().to_string();
    config.ollama.port = server.address().port();
    config.generation.provider = GenerationProvider::Ollama;
    config.retrieval.mode = mode;
    config.index_dir = Some(index_dir.path().to_path_buf());
    config
}

/// Embedding mock answering both the single-text and the batch shape with a
/// fixed three-dimensional vector.
async fn mount_embeddings(server: &MockServer, count: usize) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(BodyHasKey("prompt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2, 0.3]})),
        )
        .mount(server)
        .await;

    let vectors: Vec<Vec<f64>> = (0..count)
        .map(|i| vec![0.1 + i as f64 * 0.01, 0.2, 0.3])
        .collect();
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(BodyHasKey("input"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": vectors})))
        .mount(server)
        .await;
}

async fn build_test_index(config: &Config, mode: SynthesisMode) -> usize {
    let documents = synthesize(&sample_workbook(), mode, config.retrieval.chunk_size);
    let embedder = OllamaClient::new(&config.ollama).expect("client");
    let mut store = VectorStore::open(&config.index_dir()).await.expect("store");
    build_index(&documents, &embedder, &mut store)
        .await
        .expect("index build")
}

#[tokio::test(flavor = "multi_thread")]
async fn summary_mode_question_is_answered_with_sources() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let config = test_config(&server, &index_dir, SynthesisMode::Summary);

    mount_embeddings(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "response": "En 2023 hubo 1 venta.",
                "done": true
            })),
        )
        .mount(&server)
        .await;

    let indexed = build_test_index(&config, SynthesisMode::Summary).await;
    assert_eq!(indexed, 1);

    let pipeline = RagPipeline::new(config).await.expect("pipeline");
    let outcome = pipeline
        .query("¿Cuántas ventas hubo en 2023?")
        .await
        .expect("query");

    match outcome {
        QueryOutcome::Answered(answer) => {
            assert_eq!(answer.text, "En 2023 hubo 1 venta.");
            assert_eq!(answer.sources, vec!["resumen-ventas".to_string()]);
        }
        other => panic!("expected an answered outcome, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn greeting_short_circuits_without_touching_backends() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let config = test_config(&server, &index_dir, SynthesisMode::Summary);

    // No mocks mounted: any backend call would fail the query
    let pipeline = RagPipeline::new(config).await.expect("pipeline");
    let outcome = pipeline.query("¡Hola!").await.expect("query");

    match outcome {
        QueryOutcome::Greeting(answer) => {
            assert_eq!(answer.text, GREETING_REPLY);
            assert!(answer.sources.is_empty());
        }
        other => panic!("expected a greeting outcome, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn generation_failure_degrades_to_context_echo() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let config = test_config(&server, &index_dir, SynthesisMode::Summary);

    mount_embeddings(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    build_test_index(&config, SynthesisMode::Summary).await;

    let pipeline = RagPipeline::new(config).await.expect("pipeline");
    let outcome = pipeline
        .query("¿Cuántas ventas hubo en 2023?")
        .await
        .expect("query must not propagate the backend failure");

    match outcome {
        QueryOutcome::Degraded(answer) => {
            assert!(
                answer
                    .text
                    .starts_with("Basándome en los datos disponibles")
            );
            assert!(answer.text.contains("BASE DE DATOS COMPLETA DE VENTAS"));
            assert!(answer.sources.is_empty());
        }
        other => panic!("expected a degraded outcome, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn row_mode_retrieves_all_documents_when_k_exceeds_index_size() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let mut config = test_config(&server, &index_dir, SynthesisMode::Row);
    config.retrieval.k = Some(50);

    mount_embeddings(&server, 6).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "El producto más vendido es el Monitor."})),
        )
        .mount(&server)
        .await;

    let indexed = build_test_index(&config, SynthesisMode::Row).await;
    assert_eq!(indexed, 6);

    let pipeline = RagPipeline::new(config).await.expect("pipeline");
    let outcome = pipeline
        .query("¿Cuál es el producto más vendido?")
        .await
        .expect("query");

    match outcome {
        QueryOutcome::Answered(answer) => {
            // All six row documents contribute a distinct source label
            assert_eq!(answer.sources.len(), 6);
            assert!(answer.sources.contains(&"Ventas:1".to_string()));
            assert!(answer.sources.contains(&"Productos:2".to_string()));
        }
        other => panic!("expected an answered outcome, got {other:?}"),
    }
}

fn fixture_dataset() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ventas.xlsx")
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuild_indexes_the_dataset_and_serves_queries() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let config = test_config(&server, &index_dir, SynthesisMode::Summary);

    mount_embeddings(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "response": "Los ingresos totales fueron $70.00.",
                "done": true
            })),
        )
        .mount(&server)
        .await;

    // Constructed before any index exists; rebuild must make it queryable
    let pipeline = RagPipeline::new(config).await.expect("pipeline");
    let dataset = fixture_dataset();
    let report = pipeline
        .rebuild(Some(dataset.as_path()))
        .await
        .expect("rebuild");
    assert_eq!(report.documents_indexed, 1);

    let outcome = pipeline
        .query("¿Cuáles fueron los ingresos totales?")
        .await
        .expect("query");

    match outcome {
        QueryOutcome::Answered(answer) => {
            assert_eq!(answer.text, "Los ingresos totales fueron $70.00.");
            assert_eq!(answer.sources, vec!["resumen-ventas".to_string()]);
        }
        other => panic!("expected an answered outcome, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_rebuilds_are_rejected_while_one_runs() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let config = test_config(&server, &index_dir, SynthesisMode::Summary);

    // A slow embedding backend keeps the first rebuild in flight
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embedding": [0.1, 0.2, 0.3]}))
                .set_delay(Duration::from_millis(750)),
        )
        .mount(&server)
        .await;

    let pipeline = Arc::new(RagPipeline::new(config).await.expect("pipeline"));

    let first = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let dataset = fixture_dataset();
        async move { pipeline.rebuild(Some(dataset.as_path())).await }
    });

    // Let the first rebuild take the guard before contending
    tokio::time::sleep(Duration::from_millis(250)).await;

    let dataset = fixture_dataset();
    let error = pipeline
        .rebuild(Some(dataset.as_path()))
        .await
        .expect_err("second rebuild must be rejected while one runs");
    assert!(error.to_string().contains("already in progress"));

    let report = first
        .await
        .expect("rebuild task")
        .expect("first rebuild succeeds");
    assert_eq!(report.documents_indexed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn querying_before_indexing_reports_a_missing_index() {
    let server = MockServer::start().await;
    let index_dir = TempDir::new().expect("tempdir");
    let config = test_config(&server, &index_dir, SynthesisMode::Summary);

    mount_embeddings(&server, 1).await;

    let pipeline = RagPipeline::new(config).await.expect("pipeline");
    let error = pipeline
        .query("¿Cuántas ventas hubo en 2023?")
        .await
        .expect_err("query against an empty index must fail");

    assert!(error.to_string().contains("not been built"));
}
