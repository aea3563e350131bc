//! The OpenAI-compatible client against an in-process model server.

#![cfg(feature = "server")]

mod common;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::*;
use invoice_extractor::{
    BatchItem, ChatMessage, CompletionBackend, DocumentError, Extractor, ExtractorConfig,
    ExtractorError, OpenAiCompatibleClient,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral port and return its `/v1` base URL.
async fn spawn_model_server(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}/v1"))
}

fn config_for(base_url: &str) -> anyhow::Result<ExtractorConfig> {
    Ok(ExtractorConfig::builder()
        .llm_base_url(base_url)
        .model("stub-model")
        .llm_timeout_secs(5)
        .build()?)
}

fn completion(content: &str) -> Json<Value> {
    Json(json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn completion_round_trip_sends_key_and_returns_content() -> anyhow::Result<()> {
    async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk-local");
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if body["model"] != "stub-model" || body["stream"] != false {
            return StatusCode::BAD_REQUEST.into_response();
        }
        completion(r#"{"total":"9.99"}"#).into_response()
    }

    let base = spawn_model_server(Router::new().route("/v1/chat/completions", post(chat))).await?;
    let config = ExtractorConfig::builder()
        .llm_base_url(&base)
        .model("stub-model")
        .llm_api_key("sk-local")
        .build()?;
    let client = OpenAiCompatibleClient::from_config(&config)?;

    let reply = client
        .complete(&[ChatMessage::system("sys"), ChatMessage::user("Total: 9.99")])
        .await?;
    assert_eq!(reply, r#"{"total":"9.99"}"#);
    Ok(())
}

#[tokio::test]
async fn error_status_is_a_failure_with_the_body() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed: out of memory") }),
    );
    let base = spawn_model_server(app).await?;
    let client = OpenAiCompatibleClient::from_config(&config_for(&base)?)?;

    let err = client.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
    match err {
        DocumentError::ExtractionFailed { ref detail } => {
            assert!(detail.contains("status=500"), "got: {detail}");
            assert!(detail.contains("out of memory"), "got: {detail}");
        }
        other => panic!("expected extraction_failed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn reply_without_content_is_a_failure() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"id": "chatcmpl-1", "choices": []})) }),
    );
    let base = spawn_model_server(app).await?;
    let client = OpenAiCompatibleClient::from_config(&config_for(&base)?)?;

    let err = client.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
    assert_eq!(err.kind(), "extraction_failed");
    assert!(err.to_string().contains("choices[0].message.content"), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn probe_accepts_a_models_listing_and_rejects_errors() -> anyhow::Result<()> {
    let healthy = Router::new().route(
        "/v1/models",
        get(|| async { Json(json!({"object": "list", "data": [{"id": "stub-model"}]})) }),
    );
    let base = spawn_model_server(healthy).await?;
    OpenAiCompatibleClient::from_config(&config_for(&base)?)?
        .probe()
        .await?;

    let unhealthy = Router::new().route(
        "/v1/models",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let base = spawn_model_server(unhealthy).await?;
    let err = OpenAiCompatibleClient::from_config(&config_for(&base)?)?
        .probe()
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractorError::LlmUnreachable { .. }), "got: {err:?}");
    Ok(())
}

#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

async fn slow_chat(State(occupancy): State<Arc<Occupancy>>) -> Json<Value> {
    let now = occupancy.current.fetch_add(1, Ordering::SeqCst) + 1;
    occupancy.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    occupancy.current.fetch_sub(1, Ordering::SeqCst);
    completion(r#"{"total":"1.00"}"#)
}

#[tokio::test]
async fn queued_documents_are_not_charged_for_waiting_on_a_model_slot() -> anyhow::Result<()> {
    let occupancy = Arc::new(Occupancy::default());
    let app = Router::new()
        .route("/v1/chat/completions", post(slow_chat))
        .with_state(occupancy.clone());
    let base = spawn_model_server(app).await?;

    // Each call takes 1.2s; three of them back to back exceed the 2s window.
    let config = ExtractorConfig::builder()
        .llm_base_url(&base)
        .model("stub-model")
        .llm_timeout_secs(2)
        .llm_max_in_flight(1)
        .build()?;
    let backend = Arc::new(OpenAiCompatibleClient::from_config(&config)?);
    let recognizer = ScriptedRecognizer::new()
        .page(0, "Total: 1.00")
        .page(1, "Total: 1.00")
        .page(2, "Total: 1.00");
    let extractor = Extractor::with_components(config, Arc::new(recognizer), backend);

    let result = extractor
        .extract_batch(
            vec![
                png_for_slot("a.png", 0),
                png_for_slot("b.png", 1),
                png_for_slot("c.png", 2),
            ],
            3,
            false,
        )
        .await;

    for item in &result.results {
        match item {
            BatchItem::Ok(d) => assert_eq!(d.fields.total.as_str(), "1.00"),
            BatchItem::Error(f) => panic!("{} failed: {} {}", f.filename, f.kind, f.error),
        }
    }
    assert_eq!(result.summary.ok, 3);
    assert_eq!(occupancy.peak.load(Ordering::SeqCst), 1);
    Ok(())
}
