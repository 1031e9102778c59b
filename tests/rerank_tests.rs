use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

use ai_provider_engine::{
    errors::AppError,
    providers::{ConnectionConfig, Provider, RerankProvider, rerank::RerankApiProvider},
};

fn create_test_provider(server: &MockServer) -> RerankApiProvider {
    let mut connection = ConnectionConfig::new("jina-key", format!("{}/v1", server.uri()));
    connection.max_retries = 0;
    connection.extra.insert("model".to_string(), json!("test-reranker"));
    RerankApiProvider::new(connection).unwrap()
}

fn documents() -> Vec<String> {
    vec!["apples".to_string(), "rust borrow checker".to_string(), "ownership".to_string()]
}

#[tokio::test]
async fn test_rerank_sorted_by_score() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .and(header("authorization", "Bearer jina-key"))
        .and(body_partial_json(json!({
            "model": "test-reranker",
            "query": "rust memory model",
            "documents": ["apples", "rust borrow checker", "ownership"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-reranker",
            "results": [
                {"index": 0, "relevance_score": 0.02},
                {"index": 2, "relevance_score": 0.71},
                {"index": 1, "relevance_score": 0.93}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = create_test_provider(&mock_server);
    let results = provider.rerank("rust memory model", &documents(), None).await.unwrap();

    let order: Vec<usize> = results.iter().map(|r| r.index).collect();
    assert_eq!(order, vec![1, 2, 0]);
    assert!(results.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
}

#[tokio::test]
async fn test_rerank_top_n() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .and(body_partial_json(json!({"top_n": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"index": 2, "relevance_score": 0.5},
                {"index": 1, "relevance_score": 0.9}
            ]
        })))
        .mount(&mock_server)
        .await;

    let provider = create_test_provider(&mock_server);
    let results = provider.rerank("q", &documents(), Some(1)).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].index, 1);
}

#[tokio::test]
async fn test_rerank_empty_documents_skips_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let provider = create_test_provider(&mock_server);
    assert!(provider.rerank("q", &[], Some(3)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rerank_out_of_range_index() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"index": 7, "relevance_score": 0.5}]
        })))
        .mount(&mock_server)
        .await;

    let provider = create_test_provider(&mock_server);
    let result = provider.rerank("q", &documents(), None).await;
    assert!(matches!(result, Err(AppError::ResponseParseError(_))));
}

#[tokio::test]
async fn test_rerank_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&mock_server)
        .await;

    let provider = create_test_provider(&mock_server);
    match provider.test(None).await {
        Err(AppError::ApiCallFailure { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("expected ApiCallFailure, got {:?}", other),
    }
}

#[test]
fn test_meta_reports_configured_model() {
    let provider = RerankApiProvider::new(ConnectionConfig::new("", "https://api.jina.ai/v1")).unwrap();
    let meta = provider.meta();
    assert_eq!(meta.type_name, "rerank_api");
    assert_eq!(meta.model, "jina-reranker-v2-base-multilingual");
}
