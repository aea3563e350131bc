//! CLI binary for invoice-extractor.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `ExtractorConfig`, then either serves HTTP or processes local files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use invoice_extractor::server::{self, ServerOptions};
use invoice_extractor::{
    BatchItem, BatchProgressCallback, BatchResult, Document, Extractor, ExtractorConfig,
    InvoiceField, ProgressCallback, TesseractRecognizer, MAX_BATCH_CONCURRENCY,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar plus one log line per finished document. Documents finish
/// out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, _index: usize, _total: usize, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(&self, _index: usize, _total: usize, filename: &str) {
        self.bar.println(format!("  {} {}", green("✓"), filename));
        self.bar.inc(1);
    }

    fn on_document_error(&self, _index: usize, _total: usize, filename: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), filename, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} files extracted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files extracted  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service against a local Ollama
  invoice-extractor serve --port 8000

  # Extract a folder of receipts to CSV
  invoice-extractor extract receipts/*.jpg --csv -o invoices.csv

  # Print the OCR text of one scan
  invoice-extractor ocr receipt.png

ENVIRONMENT VARIABLES (also read from ./.env):
  OLLAMA_BASE        OpenAI-compatible base URL (default http://localhost:11434/v1)
  LLM_MODEL          Model name (default gemma3:latest)
  OLLAMA_KEY         Bearer token, if the endpoint needs one
  TESSERACT_CMD      Path to the tesseract executable
  PDFIUM_LIB_PATH    Directory containing libpdfium (PDF input only)
  RUST_LOG           Overrides --verbose/--quiet log filtering
"#;

/// Extract invoice fields from scans with Tesseract and a local LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extractor",
    version,
    about = "Extract invoice fields from scanned documents with OCR and a local LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Extract fields from local files.
    Extract(ExtractArgs),
    /// Print the recognized text of one file.
    Ocr(OcrArgs),
}

/// Pipeline settings shared by every subcommand.
#[derive(Args, Debug)]
struct EngineArgs {
    /// OpenAI-compatible base URL, including /v1.
    #[arg(long, env = "OLLAMA_BASE", default_value = "http://localhost:11434/v1")]
    llm_base: String,

    /// Model name as listed by GET /models.
    #[arg(long, env = "LLM_MODEL", default_value = "gemma3:latest")]
    model: String,

    /// Bearer token for the model endpoint.
    #[arg(long, env = "OLLAMA_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Tesseract executable.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: PathBuf,

    /// Tesseract language(s), e.g. eng or eng+deu.
    #[arg(long, env = "TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "OCR_TIMEOUT_SECS", default_value_t = 60)]
    ocr_timeout: u64,

    /// Model call timeout in seconds.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 180)]
    llm_timeout: u64,

    /// Maximum concurrent model requests.
    #[arg(long, env = "LLM_MAX_IN_FLIGHT", default_value_t = 4)]
    llm_max_in_flight: usize,

    /// Maximum PDF pages processed per document.
    #[arg(long, env = "MAX_PDF_PAGES", default_value_t = 10)]
    max_pdf_pages: usize,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// File containing a custom system prompt.
    #[arg(long, env = "SYSTEM_PROMPT_FILE")]
    system_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    engine: EngineArgs,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Request body limit in megabytes.
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: usize,

    /// Default documents in flight per batch request.
    #[arg(long, env = "BATCH_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=MAX_BATCH_CONCURRENCY as i64))]
    batch_concurrency: u16,

    /// Start even if GET /models fails.
    #[arg(long)]
    skip_llm_probe: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Image or PDF files.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,

    /// Documents in flight.
    #[arg(short, long, env = "BATCH_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=MAX_BATCH_CONCURRENCY as i64))]
    concurrency: u16,

    /// Write a CSV table instead of JSON.
    #[arg(long)]
    csv: bool,

    /// Include the raw OCR text in JSON output.
    #[arg(long)]
    include_ocr_text: bool,

    /// Write to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// Image or PDF file.
    file: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `extract`.
    let show_progress = match cli.command {
        Command::Extract(ref args) => !cli.quiet && !args.no_progress,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Extract(args) => run_extract(args, show_progress).await,
        Command::Ocr(args) => run_ocr(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.engine, usize::from(args.batch_concurrency), None).await?;

    let tesseract = TesseractRecognizer::from_config(&config);
    if !tesseract.is_available().await {
        warn!(
            "'{}' is not runnable; every document will fail at the recognize stage",
            config.tesseract_cmd.display()
        );
    }

    let extractor = Arc::new(Extractor::new(config).context("Failed to build pipeline")?);
    let options = ServerOptions {
        host: args.host,
        port: args.port,
        max_upload_mb: args.max_upload_mb,
        skip_llm_probe: args.skip_llm_probe,
    };
    server::serve(extractor, options)
        .await
        .context("Server stopped")?;
    Ok(())
}

async fn run_extract(args: ExtractArgs, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let concurrency = usize::from(args.concurrency);
    let config = build_config(&args.engine, concurrency, progress).await?;
    let extractor = Extractor::new(config).context("Failed to build pipeline")?;

    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let document = Document::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        documents.push(document);
    }

    let result = extractor
        .extract_batch(documents, concurrency, args.include_ocr_text)
        .await;

    let sink: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    if args.csv {
        write_csv(sink, &result)?;
    } else {
        let mut sink = sink;
        serde_json::to_writer_pretty(&mut sink, &result).context("Failed to serialise output")?;
        writeln!(sink).context("Failed to write output")?;
        sink.flush().context("Failed to write output")?;
    }

    if let Some(ref path) = args.output {
        eprintln!(
            "{}  {}/{} ok  →  {}",
            dim("wrote"),
            result.summary.ok,
            result.summary.total,
            bold(&path.display().to_string())
        );
    }

    if result.summary.total > 0 && result.summary.ok == 0 {
        anyhow::bail!("All {} documents failed", result.summary.total);
    }
    Ok(())
}

async fn run_ocr(args: OcrArgs) -> Result<()> {
    let config = build_config(&args.engine, 1, None).await?;
    let extractor = Extractor::new(config).context("Failed to build pipeline")?;
    let document = Document::from_path(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let output = extractor
        .ocr_document(&document)
        .await
        .with_context(|| format!("OCR failed for {}", document.filename))?;
    println!("{}", output.ocr_text);
    Ok(())
}

/// One row per document: filename, the eleven fields, status, error.
fn write_csv(sink: Box<dyn Write>, result: &BatchResult) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);

    let mut header = vec!["filename"];
    header.extend(InvoiceField::ALL.iter().map(|f| f.as_str()));
    header.extend(["status", "error"]);
    writer.write_record(&header).context("Failed to write CSV")?;

    for item in &result.results {
        let mut row: Vec<String> = vec![item.filename().to_string()];
        match item {
            BatchItem::Ok(extraction) => {
                row.extend(extraction.fields.iter().map(|(_, v)| v.as_str().to_string()));
                row.extend(["ok".to_string(), String::new()]);
            }
            BatchItem::Error(failed) => {
                row.extend(InvoiceField::ALL.iter().map(|_| String::new()));
                row.extend(["error".to_string(), failed.error.clone()]);
            }
        }
        writer.write_record(&row).context("Failed to write CSV")?;
    }

    writer.flush().context("Failed to write CSV")?;
    Ok(())
}

/// Map CLI args to `ExtractorConfig`.
async fn build_config(
    engine: &EngineArgs,
    batch_concurrency: usize,
    progress: Option<ProgressCallback>,
) -> Result<ExtractorConfig> {
    let mut builder = ExtractorConfig::builder()
        .llm_base_url(engine.llm_base.clone())
        .model(engine.model.clone())
        .tesseract_cmd(engine.tesseract_cmd.clone())
        .tesseract_lang(engine.tesseract_lang.clone())
        .ocr_timeout_secs(engine.ocr_timeout)
        .llm_timeout_secs(engine.llm_timeout)
        .llm_max_in_flight(engine.llm_max_in_flight)
        .max_pdf_pages(engine.max_pdf_pages)
        .batch_concurrency(batch_concurrency);

    if let Some(ref key) = engine.api_key {
        builder = builder.llm_api_key(key.clone());
    }
    if let Some(ref dir) = engine.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(ref path) = engine.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
