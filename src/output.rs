//! Result types returned by the pipeline and serialized by the service.

use crate::error::{DocumentError, Stage};
use crate::record::ExtractionRecord;
use serde::{Deserialize, Serialize};

/// Milliseconds spent in each stage of one document's pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub preprocess: u64,
    pub ocr: u64,
    pub focus: u64,
    pub llm: u64,
    pub total: u64,
}

/// Recognized text of one document, page by page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedText {
    /// Trimmed OCR output per page, in page order.
    pub pages: Vec<String>,
}

impl RecognizedText {
    /// All pages joined with a newline.
    pub fn joined(&self) -> String {
        self.pages.join("\n").trim().to_string()
    }
}

/// Output of the OCR-only operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutput {
    pub filename: String,
    pub ocr_text: String,
    pub pages: usize,
}

/// A successful single-document extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub filename: String,
    pub fields: ExtractionRecord,
    /// Raw OCR text, only when requested.
    pub ocr_text: Option<String>,
    pub model: String,
    #[serde(rename = "timings_ms")]
    pub timings: StageTimings,
}

/// A failed slot of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub filename: String,
    pub stage: Stage,
    pub kind: String,
    pub error: String,
}

impl FailedDocument {
    pub fn new(filename: impl Into<String>, error: &DocumentError) -> Self {
        Self {
            filename: filename.into(),
            stage: error.stage(),
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }
}

/// One slot of a batch result, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Ok(DocumentExtraction),
    Error(FailedDocument),
}

impl BatchItem {
    pub fn filename(&self) -> &str {
        match self {
            BatchItem::Ok(d) => &d.filename,
            BatchItem::Error(f) => &f.filename,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BatchItem::Ok(_))
    }
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub ok: usize,
    pub error: usize,
    pub total: usize,
}

/// Per-document outcomes in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub summary: BatchSummary,
    pub results: Vec<BatchItem>,
}

impl BatchResult {
    pub fn from_items(results: Vec<BatchItem>) -> Self {
        let ok = results.iter().filter(|r| r.is_ok()).count();
        Self {
            summary: BatchSummary {
                ok,
                error: results.len() - ok,
                total: results.len(),
            },
            results,
        }
    }
}
