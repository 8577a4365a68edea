use super::*;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-model".to_string(),
        generation_model: "test-chat".to_string(),
        batch_size: 128,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = OllamaConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn embed_request_serialization() {
    let request = EmbedRequest {
        model: "nomic-embed-text:latest".to_string(),
        prompt: "¿Cuántas ventas hubo en 2023?".to_string(),
    };
    let json = serde_json::to_value(&request).expect("serialize");
    assert_eq!(json["model"], "nomic-embed-text:latest");
    assert_eq!(json["prompt"], "¿Cuántas ventas hubo en 2023?");

    let batch = BatchEmbedRequest {
        model: "nomic-embed-text:latest".to_string(),
        inputs: vec!["a".to_string(), "b".to_string()],
    };
    let json = serde_json::to_value(&batch).expect("serialize");
    assert_eq!(json["input"].as_array().map(Vec::len), Some(2));
}

#[test]
fn embed_response_parsing() {
    let single: EmbedResponse =
        serde_json::from_str(r#"{"embedding": [0.1, 0.2, 0.3]}"#).expect("parse");
    assert_eq!(single.embedding.len(), 3);

    let batch: BatchEmbedResponse =
        serde_json::from_str(r#"{"embeddings": [[0.1], [0.2]]}"#).expect("parse");
    assert_eq!(batch.embeddings.len(), 2);
}
