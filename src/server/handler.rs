//! Route handlers.

use super::error::{from_multipart_error, ApiError};
use super::AppState;
use crate::config::MAX_BATCH_CONCURRENCY;
use crate::output::{BatchResult, DocumentExtraction};
use crate::pipeline::input::Document;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub llm_base: String,
}

#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub filename: String,
    pub ocr_text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractQuery {
    #[serde(default)]
    pub include_ocr_text: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub include_ocr_text: bool,
    pub max_concurrency: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.extractor.config();
    Json(HealthResponse {
        status: "ok",
        model: state.extractor.model().to_string(),
        llm_base: config.llm_base_url.clone(),
    })
}

pub async fn ocr(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, ApiError> {
    let document = single_upload(&state, multipart?).await?;
    let output = state.extractor.ocr_document(&document).await?;
    Ok(Json(OcrResponse {
        filename: output.filename,
        ocr_text: output.ocr_text,
    }))
}

pub async fn extract(
    State(state): State<AppState>,
    query: Result<Query<ExtractQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DocumentExtraction>, ApiError> {
    let Query(query) = query?;
    let document = single_upload(&state, multipart?).await?;
    info!("extract: {} ({} bytes)", document.filename, document.bytes.len());
    let extraction = state
        .extractor
        .extract_document(&document, query.include_ocr_text)
        .await?;
    Ok(Json(extraction))
}

pub async fn extract_batch(
    State(state): State<AppState>,
    query: Result<Query<BatchQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Query(query) = query?;
    let concurrency = match query.max_concurrency {
        Some(n) if (1..=MAX_BATCH_CONCURRENCY).contains(&n) => n,
        Some(n) => {
            return Err(ApiError::invalid_query(format!(
                "max_concurrency must be between 1 and {MAX_BATCH_CONCURRENCY}, got {n}"
            )))
        }
        None => state.extractor.config().batch_concurrency,
    };

    let documents = read_uploads(&state, multipart?, &["files", "file"]).await?;
    if documents.is_empty() {
        return Err(ApiError::no_files());
    }
    info!(
        "extract-batch: {} files, concurrency {}",
        documents.len(),
        concurrency
    );

    let result = state
        .extractor
        .extract_batch(documents, concurrency, query.include_ocr_text)
        .await;
    Ok(Json(result))
}

// ── Upload reading ───────────────────────────────────────────────────────────

async fn single_upload(state: &AppState, multipart: Multipart) -> Result<Document, ApiError> {
    read_uploads(state, multipart, &["file"])
        .await?
        .into_iter()
        .next()
        .ok_or_else(ApiError::no_files)
}

/// Collect every file field whose name is in `names`, in request order.
async fn read_uploads(
    state: &AppState,
    mut multipart: Multipart,
    names: &[&str],
) -> Result<Vec<Document>, ApiError> {
    let limit = state.max_upload_bytes;
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| from_multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if !names.contains(&name.as_str()) {
            debug!("Skipping multipart field '{}'", name);
            continue;
        }
        let filename = field
            .file_name()
            .filter(|f| !f.is_empty())
            .unwrap_or("upload")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| from_multipart_error(e, limit))?;
        documents.push(Document::new(filename, bytes.to_vec()));
    }

    Ok(documents)
}
