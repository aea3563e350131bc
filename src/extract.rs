//! Document and batch extraction entry points.
//!
//! [`Extractor`] owns the long-lived pieces of the pipeline: the
//! configuration, the text recognizer, the completion backend and the pool of
//! model slots (`llm_max_in_flight`). It is built
//! once at startup and shared (`Arc<Extractor>`) by the HTTP handlers or the
//! CLI. Every method takes `&self`, so any number of documents may be in
//! flight at once.

use crate::config::{ExtractorConfig, MAX_BATCH_CONCURRENCY};
use crate::error::{DocumentError, ExtractorError};
use crate::output::{
    BatchItem, BatchResult, DocumentExtraction, FailedDocument, OcrOutput, RecognizedText,
    StageTimings,
};
use crate::pipeline::focus::{self, FilteredText};
use crate::pipeline::input::Document;
use crate::pipeline::llm::{ChatMessage, CompletionBackend, OpenAiCompatibleClient};
use crate::pipeline::ocr::{TesseractRecognizer, TextRecognizer};
use crate::pipeline::postprocess;
use crate::pipeline::preprocess::{self, CanonicalBitmap};
use crate::prompts::{self, DEFAULT_SYSTEM_PROMPT};
use crate::record::ExtractionRecord;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// The extraction pipeline, ready to process documents.
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractorConfig>,
    recognizer: Arc<dyn TextRecognizer>,
    backend: Arc<dyn CompletionBackend>,
    model_slots: Arc<Semaphore>,
}

impl Extractor {
    /// Build the default pipeline: Tesseract CLI plus an OpenAI-compatible
    /// model endpoint, both taken from `config`.
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractorError> {
        let recognizer = Arc::new(TesseractRecognizer::from_config(&config));
        let backend = Arc::new(OpenAiCompatibleClient::from_config(&config)?);
        Ok(Self::with_components(config, recognizer, backend))
    }

    /// Build a pipeline around caller-supplied stages.
    pub fn with_components(
        config: ExtractorConfig,
        recognizer: Arc<dyn TextRecognizer>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let model_slots = Arc::new(Semaphore::new(config.llm_max_in_flight.max(1)));
        Self {
            config: Arc::new(config),
            recognizer,
            backend,
            model_slots,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Model identifier reported with every record.
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Check the model endpoint is reachable.
    pub async fn probe(&self) -> Result<(), ExtractorError> {
        self.backend.probe().await
    }

    // ── Single document ───────────────────────────────────────────────────

    /// Preprocess and OCR a document, without calling the model.
    pub async fn recognize(&self, document: &Document) -> Result<RecognizedText, DocumentError> {
        let bitmaps = self.preprocess(document).await?;
        self.ocr_pages(&document.filename, &bitmaps).await
    }

    /// [`Self::recognize`], packaged for the OCR endpoint and CLI command.
    pub async fn ocr_document(&self, document: &Document) -> Result<OcrOutput, DocumentError> {
        let text = self.recognize(document).await?;
        Ok(OcrOutput {
            filename: document.filename.clone(),
            pages: text.pages.len(),
            ocr_text: text.joined(),
        })
    }

    /// Filter recognized text and ask the model for the fields.
    ///
    /// Returns the all-`NOT FOUND` record without a model call when nothing
    /// survives the relevance filter.
    pub async fn extract_fields(&self, ocr_text: &str) -> Result<ExtractionRecord, DocumentError> {
        let filtered = focus::focus_text(ocr_text, &self.config);
        self.extract_filtered(&filtered).await
    }

    /// Run the full pipeline over one document.
    pub async fn extract_document(
        &self,
        document: &Document,
        include_ocr_text: bool,
    ) -> Result<DocumentExtraction, DocumentError> {
        let total_start = Instant::now();
        let mut timings = StageTimings::default();

        let stage = Instant::now();
        let bitmaps = self.preprocess(document).await?;
        timings.preprocess = elapsed_ms(stage);

        let stage = Instant::now();
        let text = self.ocr_pages(&document.filename, &bitmaps).await?;
        timings.ocr = elapsed_ms(stage);
        let ocr_text = text.joined();

        let stage = Instant::now();
        let filtered = focus::focus_text(&ocr_text, &self.config);
        timings.focus = elapsed_ms(stage);
        debug!(
            "{}: {} relevant lines for the prompt",
            document.filename,
            filtered.lines.len()
        );

        let stage = Instant::now();
        let fields = self.extract_filtered(&filtered).await?;
        timings.llm = elapsed_ms(stage);
        timings.total = elapsed_ms(total_start);

        info!(
            "{}: {}/11 fields found in {}ms (preprocess={} ocr={} focus={} llm={})",
            document.filename,
            fields.found_count(),
            timings.total,
            timings.preprocess,
            timings.ocr,
            timings.focus,
            timings.llm
        );

        Ok(DocumentExtraction {
            filename: document.filename.clone(),
            fields,
            ocr_text: include_ocr_text.then_some(ocr_text),
            model: self.model().to_string(),
            timings,
        })
    }

    // ── Batch ─────────────────────────────────────────────────────────────

    /// Extract every document with at most `concurrency` in flight.
    ///
    /// Never fails as a whole: each slot is either a record or the failure
    /// of that one document, and slots come back in submission order no
    /// matter which document finishes first.
    pub async fn extract_batch(
        &self,
        documents: Vec<Document>,
        concurrency: usize,
        include_ocr_text: bool,
    ) -> BatchResult {
        let total = documents.len();
        let concurrency = concurrency.clamp(1, MAX_BATCH_CONCURRENCY);
        let progress = self.config.progress_callback.clone();
        info!(
            "Batch of {} documents, concurrency {}",
            total, concurrency
        );

        if let Some(ref cb) = progress {
            cb.on_batch_start(total);
        }

        let mut slots: Vec<(usize, BatchItem)> =
            stream::iter(documents.into_iter().enumerate().map(|(index, document)| {
                let progress = progress.clone();
                async move {
                    if let Some(ref cb) = progress {
                        cb.on_document_start(index, total, &document.filename);
                    }
                    let item = match self.extract_document(&document, include_ocr_text).await {
                        Ok(extraction) => {
                            if let Some(ref cb) = progress {
                                cb.on_document_complete(index, total, &document.filename);
                            }
                            BatchItem::Ok(extraction)
                        }
                        Err(e) => {
                            warn!("{}: failed at {}: {}", document.filename, e.stage(), e);
                            if let Some(ref cb) = progress {
                                cb.on_document_error(index, total, &document.filename, &e.to_string());
                            }
                            BatchItem::Error(FailedDocument::new(&document.filename, &e))
                        }
                    };
                    (index, item)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        slots.sort_by_key(|(index, _)| *index);
        let result = BatchResult::from_items(slots.into_iter().map(|(_, item)| item).collect());

        info!(
            "Batch complete: {}/{} ok",
            result.summary.ok, result.summary.total
        );
        if let Some(ref cb) = progress {
            cb.on_batch_complete(total, result.summary.ok);
        }
        result
    }

    // ── Stages ────────────────────────────────────────────────────────────

    async fn preprocess(&self, document: &Document) -> Result<Vec<CanonicalBitmap>, DocumentError> {
        let document = document.clone();
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || preprocess::preprocess_document(&document, &config))
            .await
            .map_err(|e| DocumentError::decode(format!("preprocessing task panicked: {e}")))?
    }

    async fn ocr_pages(
        &self,
        filename: &str,
        bitmaps: &[CanonicalBitmap],
    ) -> Result<RecognizedText, DocumentError> {
        let mut pages = Vec::with_capacity(bitmaps.len());
        for bitmap in bitmaps {
            let text = self.recognizer.recognize(bitmap).await?;
            pages.push(text.trim().to_string());
        }
        debug!(
            "{}: recognized {} chars over {} pages",
            filename,
            pages.iter().map(String::len).sum::<usize>(),
            pages.len()
        );
        Ok(RecognizedText { pages })
    }

    async fn extract_filtered(&self, filtered: &FilteredText) -> Result<ExtractionRecord, DocumentError> {
        if filtered.is_empty() {
            debug!("No relevant text, skipping model call");
            return Ok(ExtractionRecord::not_found());
        }

        let system = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let user = prompts::extraction_prompt(&filtered.to_prompt_text(self.config.max_prompt_chars));
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];

        // The timeout covers the model call only, not the wait for a slot.
        let _slot = self
            .model_slots
            .acquire()
            .await
            .map_err(|e| DocumentError::ExtractionFailed {
                detail: format!("model slots closed: {e}"),
            })?;

        let secs = self.config.llm_timeout_secs;
        let reply = tokio::time::timeout(Duration::from_secs(secs), self.backend.complete(&messages))
            .await
            .map_err(|_| DocumentError::ExtractionTimeout { secs })??;

        postprocess::interpret_reply(&reply).into_result()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
