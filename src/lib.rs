//! # invoice-extractor
//!
//! Pull structured fields out of scanned invoices and receipts using a local
//! OCR engine and a local language model.
//!
//! Receipts photographed on a phone or scanned at 150 dpi are poor input for
//! a text-only model. This crate cleans each page up, reads it with
//! Tesseract, throws away the lines that cannot hold an invoice field, and
//! asks an OpenAI-compatible model (Ollama by default) for a fixed JSON
//! object. The reply is validated and projected onto a closed set of eleven
//! fields; anything the model could not find is `"NOT FOUND"`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF bytes
//!  │
//!  ├─ 1. Input       sniff PNG/JPEG/WEBP/TIFF/BMP/PDF
//!  ├─ 2. Preprocess  rasterise, grayscale, resize, denoise, Otsu (spawn_blocking)
//!  ├─ 3. OCR         tesseract stdout --oem 1 --psm 6, per page
//!  ├─ 4. Focus       keep labelled lines and amounts, ≤ 3000 chars
//!  ├─ 5. LLM         POST /chat/completions, temperature 0
//!  └─ 6. Parse       recover the JSON object, project onto 11 fields
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_extractor::{Document, Extractor, ExtractorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = Extractor::new(ExtractorConfig::default())?;
//!     let document = Document::from_path("receipt.jpg").await?;
//!     let result = extractor.extract_document(&document, false).await?;
//!     println!("{}", serde_json::to_string_pretty(&result.fields)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP service ([`server`]) |
//! | `cli`    | on      | The `invoice-extractor` binary (clap, anyhow, tracing-subscriber, indicatif, csv) |
//!
//! Disable both when using only the library:
//! ```toml
//! invoice-extractor = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractorConfig, ExtractorConfigBuilder, MAX_BATCH_CONCURRENCY};
pub use error::{DocumentError, ExtractorError, Stage};
pub use extract::Extractor;
pub use output::{
    BatchItem, BatchResult, BatchSummary, DocumentExtraction, FailedDocument, OcrOutput,
    RecognizedText, StageTimings,
};
pub use pipeline::input::{Document, MediaKind};
pub use pipeline::llm::{ChatMessage, CompletionBackend, OpenAiCompatibleClient};
pub use pipeline::ocr::{TesseractRecognizer, TextRecognizer};
pub use pipeline::postprocess::ModelReply;
pub use pipeline::preprocess::CanonicalBitmap;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{ExtractionRecord, FieldValue, InvoiceField, SENTINEL};
