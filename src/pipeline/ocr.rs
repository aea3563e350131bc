//! Text recognition: run the external OCR engine over a canonical bitmap.
//!
//! [`TextRecognizer`] is the seam between the pipeline and the engine. The
//! default [`TesseractRecognizer`] shells out to the `tesseract` CLI:
//!
//! ```text
//! tesseract <bitmap.png> stdout -l eng --oem 1 --psm 6
//! ```
//!
//! The bitmap is written to a temp file first because the CLI reads images
//! from disk. The child process is killed if it outlives `ocr_timeout_secs`.

use crate::config::ExtractorConfig;
use crate::error::DocumentError;
use crate::pipeline::preprocess::CanonicalBitmap;
use async_trait::async_trait;
use image::ImageFormat;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Turns one canonical bitmap into raw text.
///
/// Implementations return the engine's output as-is (possibly empty); no
/// semantic validation happens at this stage.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, bitmap: &CanonicalBitmap) -> Result<String, DocumentError>;
}

/// Tesseract CLI recognizer.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    cmd: PathBuf,
    lang: String,
    oem: u8,
    psm: u8,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            cmd: config.tesseract_cmd.clone(),
            lang: config.tesseract_lang.clone(),
            oem: config.ocr_engine_mode,
            psm: config.page_seg_mode,
            timeout: Duration::from_secs(config.ocr_timeout_secs),
        }
    }

    /// Arguments following the input path.
    fn args(&self) -> Vec<String> {
        vec![
            "stdout".to_string(),
            "-l".to_string(),
            self.lang.clone(),
            "--oem".to_string(),
            self.oem.to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
        ]
    }

    /// Whether `tesseract --version` runs successfully.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.cmd)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, bitmap: &CanonicalBitmap) -> Result<String, DocumentError> {
        let image = bitmap.image.clone();
        let tmp = tokio::task::spawn_blocking(move || write_png(&image))
            .await
            .map_err(|e| DocumentError::recognition(format!("bitmap task panicked: {e}")))??;

        let mut command = Command::new(&self.cmd);
        command
            .arg(tmp.path())
            .args(self.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                DocumentError::recognition(format!(
                    "tesseract timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                DocumentError::recognition(format!(
                    "failed to run tesseract (is it installed? path='{}'): {e}",
                    self.cmd.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocumentError::recognition(format!(
                "tesseract exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("page {}: OCR produced {} chars", bitmap.page, text.len());
        Ok(text)
    }
}

fn write_png(image: &image::GrayImage) -> Result<tempfile::NamedTempFile, DocumentError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| DocumentError::recognition(format!("could not encode bitmap: {e}")))?;

    let mut tmp = tempfile::Builder::new()
        .prefix("ocr-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| DocumentError::recognition(format!("tempfile: {e}")))?;
    tmp.write_all(&buf)
        .map_err(|e| DocumentError::recognition(format!("tempfile write: {e}")))?;
    Ok(tmp)
}
