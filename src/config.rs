//! Configuration types for invoice extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractorConfig`], built via
//! its [`ExtractorConfigBuilder`]. The config is constructed once at startup
//! (the CLI maps environment variables onto the builder) and shared by `Arc`
//! with every pipeline component; nothing below this module reads the
//! environment.

use crate::error::ExtractorError;
use crate::progress::BatchProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound for per-batch concurrency.
pub const MAX_BATCH_CONCURRENCY: usize = 16;

/// Configuration for the extraction pipeline.
///
/// Built via [`ExtractorConfig::builder()`] or using
/// [`ExtractorConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice_extractor::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .llm_base_url("http://localhost:11434/v1")
///     .model("gemma3:latest")
///     .batch_concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    // ── Model endpoint ────────────────────────────────────────────────────
    /// Base URL of the OpenAI-compatible endpoint, including the `/v1`
    /// prefix. Default: `http://localhost:11434/v1` (Ollama).
    pub llm_base_url: String,

    /// Model identifier. Must match an entry of `GET /models` exactly.
    /// Default: `gemma3:latest`.
    pub model: String,

    /// Bearer token for the endpoint. Local servers usually need none.
    pub llm_api_key: Option<String>,

    /// Sampling temperature. Default: 0.0 so identical input gives identical
    /// output.
    pub temperature: f32,

    /// `max_tokens` sent with each completion. Default: 350.
    ///
    /// Eleven short JSON fields fit comfortably; a tight cap keeps a chatty
    /// model from rambling past the object.
    pub max_tokens: usize,

    /// Ollama-specific `options.num_predict`. Default: 320.
    pub num_predict: usize,

    /// Per-request timeout for the completion call in seconds. Default: 180.
    pub llm_timeout_secs: u64,

    /// TCP connect timeout for the endpoint in seconds. Default: 5.
    pub llm_connect_timeout_secs: u64,

    /// Maximum completion requests in flight at once. Default: 4.
    ///
    /// Set to 1 for model servers that only handle one request at a time.
    pub llm_max_in_flight: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    // ── OCR engine ────────────────────────────────────────────────────────
    /// Tesseract executable. Default: `tesseract` (resolved through PATH).
    pub tesseract_cmd: PathBuf,

    /// Tesseract language pack. Default: `eng`.
    pub tesseract_lang: String,

    /// Tesseract `--oem` engine mode. Default: 1 (LSTM only).
    pub ocr_engine_mode: u8,

    /// Tesseract `--psm` page segmentation mode. Default: 6 (single block).
    pub page_seg_mode: u8,

    /// Per-page OCR timeout in seconds. Default: 60.
    pub ocr_timeout_secs: u64,

    // ── Preprocessing ─────────────────────────────────────────────────────
    /// Scans wider than this are downscaled to it. Default: 1400 px.
    pub max_width: u32,

    /// Scans narrower than this are upscaled by `upscale_factor`.
    /// Default: 800 px.
    pub upscale_min_width: u32,

    /// Upscale factor for small receipts. Default: 1.5.
    pub upscale_factor: f32,

    /// Gaussian denoise sigma applied before binarisation. Default: 0.8.
    pub blur_sigma: f32,

    /// Maximum number of PDF pages rasterised per document. Default: 10.
    pub max_pdf_pages: usize,

    /// Directory containing the pdfium shared library. If None, pdfium is
    /// looked up next to the executable and then on the system path.
    pub pdfium_lib_path: Option<PathBuf>,

    // ── Relevance filter ──────────────────────────────────────────────────
    /// Leading and trailing lines always kept for context. Default: 5.
    pub context_lines: usize,

    /// Hard cap on characters sent to the model. Default: 3000.
    pub max_prompt_chars: usize,

    // ── Batch ─────────────────────────────────────────────────────────────
    /// Documents processed in parallel within one batch. Range: 1–16.
    /// Default: 4.
    pub batch_concurrency: usize,

    /// Optional progress callback for batch runs.
    pub progress_callback: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434/v1".to_string(),
            model: "gemma3:latest".to_string(),
            llm_api_key: None,
            temperature: 0.0,
            max_tokens: 350,
            num_predict: 320,
            llm_timeout_secs: 180,
            llm_connect_timeout_secs: 5,
            llm_max_in_flight: 4,
            system_prompt: None,
            tesseract_cmd: PathBuf::from("tesseract"),
            tesseract_lang: "eng".to_string(),
            ocr_engine_mode: 1,
            page_seg_mode: 6,
            ocr_timeout_secs: 60,
            max_width: 1400,
            upscale_min_width: 800,
            upscale_factor: 1.5,
            blur_sigma: 0.8,
            max_pdf_pages: 10,
            pdfium_lib_path: None,
            context_lines: 5,
            max_prompt_chars: 3000,
            batch_concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("llm_base_url", &self.llm_base_url)
            .field("model", &self.model)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("llm_max_in_flight", &self.llm_max_in_flight)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("tesseract_lang", &self.tesseract_lang)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("max_width", &self.max_width)
            .field("max_pdf_pages", &self.max_pdf_pages)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("batch_concurrency", &self.batch_concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Empty keys are treated as "no key".
    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.llm_api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn num_predict(mut self, n: usize) -> Self {
        self.config.num_predict = n;
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_timeout_secs = secs;
        self
    }

    pub fn llm_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_connect_timeout_secs = secs;
        self
    }

    pub fn llm_max_in_flight(mut self, n: usize) -> Self {
        self.config.llm_max_in_flight = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn tesseract_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_lang = lang.into();
        self
    }

    pub fn ocr_engine_mode(mut self, oem: u8) -> Self {
        self.config.ocr_engine_mode = oem;
        self
    }

    pub fn page_seg_mode(mut self, psm: u8) -> Self {
        self.config.page_seg_mode = psm;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn max_width(mut self, px: u32) -> Self {
        self.config.max_width = px.max(100);
        self
    }

    pub fn upscale_min_width(mut self, px: u32) -> Self {
        self.config.upscale_min_width = px;
        self
    }

    pub fn upscale_factor(mut self, factor: f32) -> Self {
        self.config.upscale_factor = factor.clamp(1.0, 4.0);
        self
    }

    pub fn blur_sigma(mut self, sigma: f32) -> Self {
        self.config.blur_sigma = sigma.max(0.0);
        self
    }

    pub fn max_pdf_pages(mut self, n: usize) -> Self {
        self.config.max_pdf_pages = n.max(1);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn context_lines(mut self, n: usize) -> Self {
        self.config.context_lines = n;
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n;
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n.clamp(1, MAX_BATCH_CONCURRENCY);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractorConfig, ExtractorError> {
        let c = &self.config;
        if !(c.llm_base_url.starts_with("http://") || c.llm_base_url.starts_with("https://")) {
            return Err(ExtractorError::InvalidConfig(format!(
                "LLM base URL must be http(s), got '{}'",
                c.llm_base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractorError::InvalidConfig(
                "Model name must not be empty".into(),
            ));
        }
        if c.llm_timeout_secs == 0 || c.llm_connect_timeout_secs == 0 || c.ocr_timeout_secs == 0 {
            return Err(ExtractorError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.upscale_min_width > c.max_width {
            return Err(ExtractorError::InvalidConfig(format!(
                "upscale_min_width ({}) must not exceed max_width ({})",
                c.upscale_min_width, c.max_width
            )));
        }
        if c.max_prompt_chars == 0 {
            return Err(ExtractorError::InvalidConfig(
                "max_prompt_chars must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
