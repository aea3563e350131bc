//! Error types for the invoice-extractor library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractorError`] — **Fatal**: the service or CLI cannot proceed at all
//!   (invalid configuration, model endpoint unreachable at startup, socket
//!   bind failure). Returned as `Err(ExtractorError)` from setup functions.
//!
//! * [`DocumentError`] — **Non-fatal**: a single document failed (corrupt
//!   bytes, OCR engine crash, model timeout) but every other document in the
//!   batch is fine. Stored inside [`crate::output::BatchItem`] so callers see
//!   partial success instead of losing the whole batch to one bad file.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the invoice-extractor library.
///
/// Document-level failures use [`DocumentError`] and are reported per slot
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractorError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── LLM endpoint errors ───────────────────────────────────────────────
    /// The HTTP client for the model endpoint could not be constructed.
    #[error("Failed to build HTTP client for '{base_url}': {detail}")]
    HttpClient { base_url: String, detail: String },

    /// The startup probe (`GET /models`) failed.
    #[error(
        "LLM server not reachable at '{base_url}': {detail}\n\
Start the model server (e.g. `ollama serve`) or pass --skip-llm-probe."
    )]
    LlmUnreachable { base_url: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not bind the HTTP listener.
    #[error("Failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

}

/// The pipeline stage a document was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Decoding, rasterisation and bitmap normalisation.
    Preprocess,
    /// The external OCR engine.
    Recognize,
    /// The language-model call and reply validation.
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Preprocess => "preprocess",
            Stage::Recognize => "recognize",
            Stage::Extract => "extract",
        })
    }
}

/// A non-fatal error for a single document.
///
/// None of these are retried. In batch mode they become a failed slot; in
/// single-document mode they become the error response.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentError {
    /// The bytes are not a supported image or PDF, or could not be decoded.
    #[serde(rename = "decode_error")]
    #[error("Unsupported or corrupted document: {detail}")]
    Decode { detail: String },

    /// The document is a PDF but the pdfium library could not be loaded.
    /// A deployment problem, not a problem with the upload.
    #[serde(rename = "pdf_unavailable")]
    #[error("PDF support unavailable: {detail}")]
    PdfUnavailable { detail: String },

    /// The OCR engine is missing, crashed, or ran past its timeout.
    #[serde(rename = "recognition_error")]
    #[error("OCR failed: {detail}")]
    Recognition { detail: String },

    /// The model endpoint did not answer within the configured window.
    #[error("LLM call timed out after {secs}s")]
    ExtractionTimeout { secs: u64 },

    /// The model endpoint was unreachable or answered with an error.
    #[error("LLM call failed: {detail}")]
    ExtractionFailed { detail: String },

    /// The model replied, but no JSON object could be recovered from it.
    #[serde(rename = "extraction_parse_error")]
    #[error("Could not parse JSON from LLM reply: {detail}")]
    ExtractionParse { detail: String },
}

impl DocumentError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            DocumentError::Decode { .. } | DocumentError::PdfUnavailable { .. } => {
                Stage::Preprocess
            }
            DocumentError::Recognition { .. } => Stage::Recognize,
            DocumentError::ExtractionTimeout { .. }
            | DocumentError::ExtractionFailed { .. }
            | DocumentError::ExtractionParse { .. } => Stage::Extract,
        }
    }

    /// Stable machine-readable code, identical to the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::Decode { .. } => "decode_error",
            DocumentError::PdfUnavailable { .. } => "pdf_unavailable",
            DocumentError::Recognition { .. } => "recognition_error",
            DocumentError::ExtractionTimeout { .. } => "extraction_timeout",
            DocumentError::ExtractionFailed { .. } => "extraction_failed",
            DocumentError::ExtractionParse { .. } => "extraction_parse_error",
        }
    }

    pub(crate) fn decode(detail: impl Into<String>) -> Self {
        DocumentError::Decode {
            detail: detail.into(),
        }
    }

    pub(crate) fn recognition(detail: impl Into<String>) -> Self {
        DocumentError::Recognition {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_match_kinds() {
        assert_eq!(DocumentError::decode("x").stage(), Stage::Preprocess);
        assert_eq!(DocumentError::recognition("x").stage(), Stage::Recognize);
        assert_eq!(
            DocumentError::ExtractionTimeout { secs: 5 }.stage(),
            Stage::Extract
        );
        assert_eq!(
            DocumentError::ExtractionParse { detail: "x".into() }.stage(),
            Stage::Extract
        );
    }

    #[test]
    fn serialized_kind_matches_kind() {
        let errors = [
            DocumentError::decode("bad magic"),
            DocumentError::PdfUnavailable {
                detail: "no libpdfium".into(),
            },
            DocumentError::recognition("no tesseract"),
            DocumentError::ExtractionTimeout { secs: 180 },
            DocumentError::ExtractionFailed {
                detail: "connection refused".into(),
            },
            DocumentError::ExtractionParse {
                detail: "no object".into(),
            },
        ];
        for err in errors {
            let value = serde_json::to_value(&err).unwrap();
            assert_eq!(value["kind"], err.kind(), "for {err:?}");
        }
    }

    #[test]
    fn timeout_display() {
        let e = DocumentError::ExtractionTimeout { secs: 180 };
        assert!(e.to_string().contains("180s"), "got: {e}");
    }

    #[test]
    fn unreachable_display_mentions_base_url() {
        let e = ExtractorError::LlmUnreachable {
            base_url: "http://localhost:11434/v1".into(),
            detail: "connection refused".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("localhost:11434"), "got: {msg}");
        assert!(msg.contains("connection refused"), "got: {msg}");
    }
}
