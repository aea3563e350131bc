//! Stub pipeline stages shared by the integration tests.
//!
//! Documents are plain gray PNGs whose *width* selects the scripted OCR text,
//! so no Tesseract install or model server is needed.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use invoice_extractor::{
    CanonicalBitmap, ChatMessage, CompletionBackend, Document, DocumentError, Extractor,
    ExtractorConfig, TextRecognizer,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Widths stay inside the default resize band, so preprocessing keeps them.
pub const WIDTH_BASE: u32 = 900;

/// A PNG whose width is `WIDTH_BASE + slot`.
pub fn png_for_slot(filename: &str, slot: u32) -> Document {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(WIDTH_BASE + slot, 16, Luma([220])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    Document::new(filename, bytes)
}

pub fn corrupt_document(filename: &str) -> Document {
    Document::new(filename, b"\x00\x01definitely not an image".to_vec())
}

/// Recognizer returning scripted text keyed by bitmap width.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: HashMap<u32, (String, Duration)>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, slot: u32, text: &str) -> Self {
        self.scripts
            .insert(WIDTH_BASE + slot, (text.to_string(), Duration::ZERO));
        self
    }

    /// Like [`Self::page`] but finishing only after `delay`.
    pub fn slow_page(mut self, slot: u32, text: &str, delay: Duration) -> Self {
        self.scripts.insert(WIDTH_BASE + slot, (text.to_string(), delay));
        self
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn recognize(&self, bitmap: &CanonicalBitmap) -> Result<String, DocumentError> {
        let width = bitmap.image.width();
        match self.scripts.get(&width) {
            Some((text, delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
            None => Err(DocumentError::Recognition {
                detail: format!("no script for width {width}"),
            }),
        }
    }
}

static RE_INVOICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Invoice #([^\s,]+)").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Date (\d{4}-\d{2}-\d{2})").unwrap());
static RE_TOTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"Total: ([\d.]+)").unwrap());

/// Deterministic "model" that reads the prompt with regexes.
///
/// Prompt markers change its behaviour: `SLOW` sleeps past any test timeout,
/// `GARBAGE` answers with prose, `HTTP500` fails like an unhealthy server.
#[derive(Default)]
pub struct RuleBackend {
    pub calls: AtomicUsize,
}

impl RuleBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for RuleBackend {
    fn model(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DocumentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &messages[messages.len() - 1].content;

        if prompt.contains("SLOW") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if prompt.contains("GARBAGE") {
            return Ok("Sorry, I cannot read this receipt.".to_string());
        }
        if prompt.contains("HTTP500") {
            return Err(DocumentError::ExtractionFailed {
                detail: "status=500 body=internal error".to_string(),
            });
        }

        let mut object = serde_json::Map::new();
        if let Some(c) = RE_INVOICE.captures(prompt) {
            object.insert("invoice_number".into(), c[1].into());
        }
        if let Some(c) = RE_DATE.captures(prompt) {
            object.insert("invoice_date".into(), c[1].into());
        }
        if let Some(c) = RE_TOTAL.captures(prompt) {
            object.insert("total".into(), c[1].into());
        }
        object.insert("vendor_name".into(), "ignored".into());

        Ok(format!(
            "Here you go:\n```json\n{}\n```",
            serde_json::Value::Object(object)
        ))
    }
}

pub fn test_config() -> ExtractorConfig {
    ExtractorConfig::builder()
        .llm_timeout_secs(1)
        .build()
        .expect("valid config")
}

pub fn extractor(recognizer: ScriptedRecognizer, backend: Arc<RuleBackend>) -> Extractor {
    extractor_with_config(test_config(), recognizer, backend)
}

pub fn extractor_with_config(
    config: ExtractorConfig,
    recognizer: ScriptedRecognizer,
    backend: Arc<RuleBackend>,
) -> Extractor {
    Extractor::with_components(config, Arc::new(recognizer), backend)
}

pub const SCENARIO_TEXT: &str = "ACME SUPPLIES\n12 Harbour Rd\nInvoice #2022435\nDate 2022-07-19\nWidgets x4\nTotal: 2510.00\nThank you";
