//! HTTP surface tests
//!
//! Drive the router directly with tower's `oneshot`; no listener and
//! no inference server involved. The orchestrator runs with an empty
//! provider registry, so any request that would reach the network
//! fails fast instead.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use async_trait::async_trait;
use llm_relay::config::Settings;
use llm_relay::errors::{RelayError, Result};
use llm_relay::orchestrator::ChatOrchestrator;
use llm_relay::providers::{Completion, CompletionRequest, FragmentStream, ProviderClient};
use llm_relay::server;
use llm_relay::types::{ModelInfo, ProviderKind, Usage};

fn test_router() -> Router {
    let orchestrator = Arc::new(ChatOrchestrator::new(&Settings::default(), HashMap::new()));
    server::router(orchestrator)
}

/// Provider double emitting a fixed fragment sequence
struct SseProvider {
    fragments: Vec<String>,
    fail_mid_stream: bool,
}

#[async_trait]
impl ProviderClient for SseProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn base_url(&self) -> &str {
        "mock://sse"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion> {
        Ok(Completion {
            content: self.fragments.concat(),
            usage: Usage::default(),
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<FragmentStream> {
        let mut items: Vec<Result<String>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(RelayError::Upstream("connection reset".to_string())));
        }
        Ok(Box::pin(futures_util::stream::iter(items)))
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn streaming_router(fail_mid_stream: bool) -> Router {
    let provider = SseProvider {
        fragments: vec!["Hel".to_string(), "lo".to_string()],
        fail_mid_stream,
    };
    let mut providers: HashMap<ProviderKind, Arc<dyn ProviderClient>> = HashMap::new();
    providers.insert(ProviderKind::Ollama, Arc::new(provider));

    let orchestrator = Arc::new(ChatOrchestrator::new(&Settings::default(), providers));
    server::router(orchestrator)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = test_router().oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    // Both provider kinds are reported, neither is configured
    assert_eq!(body["services"]["ollama"], false);
    assert_eq!(body["services"]["llamacpp"], false);
}

#[tokio::test]
async fn test_chat_with_unconfigured_provider_is_client_error() {
    let request = json_request(
        "POST",
        "/api/chat",
        serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "ollama"
        }),
    );

    let response = test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("ollama"));
}

#[tokio::test]
async fn test_chat_rejects_out_of_range_temperature() {
    let request = json_request(
        "POST",
        "/api/chat",
        serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 3.5
        }),
    );

    let response = test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("temperature"));
}

#[tokio::test]
async fn test_unknown_conversation_is_404() {
    let response = test_router()
        .oneshot(empty_request("GET", "/api/chat/conversations/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = test_router()
        .oneshot(empty_request("DELETE", "/api/chat/conversations/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_models_listing_empty_without_providers() {
    let response = test_router().oneshot(empty_request("GET", "/api/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_provider_status_listing() {
    let response = test_router()
        .oneshot(empty_request("GET", "/api/models/providers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let statuses = body.as_array().unwrap();
    assert_eq!(statuses.len(), 2);
    for status in statuses {
        assert_eq!(status["available"], false);
        assert_eq!(status["error"], "Provider not configured");
    }
}

#[tokio::test]
async fn test_provider_probe_endpoint() {
    // Unknown provider name
    let response = test_router()
        .oneshot(json_request(
            "POST",
            "/api/models/test/openai",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Known but unconfigured provider
    let response = test_router()
        .oneshot(json_request(
            "POST",
            "/api/models/test/ollama",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Configured provider answers the probe
    let response = streaming_router(false)
        .oneshot(json_request(
            "POST",
            "/api/models/test/ollama",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["response"], "Hello");
}

#[tokio::test]
async fn test_prompt_listing_and_tag_filter() {
    let response = test_router().oneshot(empty_request("GET", "/api/prompts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 4);

    let response = test_router()
        .oneshot(empty_request("GET", "/api/prompts?tags=programming"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let prompts = body.as_array().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0]["id"], "coding");
}

#[tokio::test]
async fn test_prompt_crud_roundtrip() {
    let router = test_router();

    let create = json_request(
        "POST",
        "/api/prompts",
        serde_json::json!({
            "name": "Terse",
            "content": "Answer in one sentence, {name}."
        }),
    );
    let response = router.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["is_default"], false);

    let update = json_request(
        "PUT",
        &format!("/api/prompts/{}", id),
        serde_json::json!({"content": "Answer briefly."}),
    );
    let response = router.clone().oneshot(update).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["content"], "Answer briefly.");

    let response = router
        .clone()
        .oneshot(empty_request("DELETE", &format!("/api/prompts/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(empty_request("GET", &format!("/api/prompts/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_prompt_rejects_malformed_template() {
    let request = json_request(
        "POST",
        "/api/prompts",
        serde_json::json!({"name": "Broken", "content": "Hello {name"}),
    );

    let response = test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_default_prompt_mutations_refused() {
    let router = test_router();

    let update = json_request(
        "PUT",
        "/api/prompts/default",
        serde_json::json!({"content": "hijacked"}),
    );
    let response = router.clone().oneshot(update).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .clone()
        .oneshot(empty_request("DELETE", "/api/prompts/coding"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The default set is untouched
    let response = router.oneshot(empty_request("GET", "/api/prompts/coding")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_validate_endpoint() {
    let request = json_request(
        "POST",
        "/api/prompts/validate",
        serde_json::json!({"content": "Hello {name}"}),
    );
    let response = test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["variables"], serde_json::json!(["name"]));
    assert_eq!(body["errors"], serde_json::json!([]));

    let request = json_request(
        "POST",
        "/api/prompts/validate",
        serde_json::json!({"content": "Hello {name"}),
    );
    let response = test_router().oneshot(request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert!(!body["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_endpoint_frames_fragments_as_sse() {
    let request = json_request(
        "POST",
        "/api/chat/stream",
        serde_json::json!({"messages": [{"role": "user", "content": "hi"}]}),
    );

    let response = streaming_router(false).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(body.contains(r#"data: {"content":"Hel"}"#), "got: {}", body);
    assert!(body.contains(r#"data: {"content":"lo"}"#));
    assert!(body.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn test_stream_endpoint_reports_error_in_band() {
    let request = json_request(
        "POST",
        "/api/chat/stream",
        serde_json::json!({"messages": [{"role": "user", "content": "hi"}]}),
    );

    let response = streaming_router(true).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    // Fragments before the failure still arrive, then the error event
    // ends the stream; no [DONE] after an error
    assert!(body.contains(r#"data: {"content":"Hel"}"#));
    assert!(body.contains(r#""error""#));
    assert!(!body.contains("[DONE]"));
}

fn multipart_upload(content_type: &str, payload: &str) -> Request<Body> {
    let boundary = "test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"note.txt\"\r\n\
         Content-Type: {ct}\r\n\r\n{payload}\r\n--{b}--\r\n",
        b = boundary,
        ct = content_type,
        payload = payload,
    );

    Request::builder()
        .method("POST")
        .uri("/api/files/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_file_upload_roundtrip() {
    let router = test_router();

    let response = router
        .clone()
        .oneshot(multipart_upload("text/plain", "hello world"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let metadata = body_json(response).await;
    assert_eq!(metadata["filename"], "note.txt");
    assert_eq!(metadata["size"], 11);
    assert_eq!(metadata["category"], "document");
    let id = metadata["id"].as_str().unwrap().to_string();

    // Retrieve raw bytes
    let response = router
        .clone()
        .oneshot(empty_request("GET", &format!("/api/files/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world");

    // Listing shows it, deletion removes it
    let response = router.clone().oneshot(empty_request("GET", "/api/files")).await.unwrap();
    assert_eq!(body_json(response).await["files"].as_array().unwrap().len(), 1);

    let response = router
        .clone()
        .oneshot(empty_request("DELETE", &format!("/api/files/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(empty_request("GET", &format!("/api/files/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_file_upload_rejects_disallowed_type() {
    let response = test_router()
        .oneshot(multipart_upload("application/x-msdownload", "MZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_prompt_statistics_endpoint() {
    let response = test_router()
        .oneshot(empty_request("GET", "/api/prompts/stats/summary"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total_prompts"], 4);
    assert_eq!(body["default_prompts"], 4);
    assert_eq!(body["custom_prompts"], 0);
}
