//! Input classification: decide whether an uploaded file is an image or a PDF.
//!
//! Uploads arrive with whatever filename and content type the client chose,
//! so the bytes are sniffed first (`%PDF` magic, then `image::guess_format`)
//! and the extension is only a fallback. Anything that matches neither is a
//! [`DocumentError::Decode`] before any decoding work is attempted.

use crate::error::DocumentError;
use image::ImageFormat;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Image formats accepted by the preprocessor.
pub const SUPPORTED_IMAGE_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
];

/// What kind of document a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image(ImageFormat),
    Pdf,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Pdf => f.write_str("pdf"),
            MediaKind::Image(format) => {
                let ext = format.extensions_str().first().copied().unwrap_or("image");
                f.write_str(ext)
            }
        }
    }
}

/// One submitted file.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk, keeping only the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }

    /// Infer the media kind from content, then extension.
    pub fn media_kind(&self) -> Result<MediaKind, DocumentError> {
        detect_media_kind(&self.filename, &self.bytes)
    }
}

/// Sniff the bytes, fall back to the filename extension.
pub fn detect_media_kind(filename: &str, bytes: &[u8]) -> Result<MediaKind, DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::decode(format!("'{filename}' is empty")));
    }

    if bytes.starts_with(b"%PDF") {
        return Ok(MediaKind::Pdf);
    }

    if let Ok(format) = image::guess_format(bytes) {
        if SUPPORTED_IMAGE_FORMATS.contains(&format) {
            debug!("{}: sniffed {:?}", filename, format);
            return Ok(MediaKind::Image(format));
        }
        return Err(DocumentError::decode(format!(
            "'{filename}' is a {format:?} image; supported: png, jpeg, webp, tiff, bmp, pdf"
        )));
    }

    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("pdf") => Ok(MediaKind::Pdf),
        Some(ext) => match ImageFormat::from_extension(ext) {
            Some(format) if SUPPORTED_IMAGE_FORMATS.contains(&format) => {
                Ok(MediaKind::Image(format))
            }
            _ => Err(unrecognised(filename, bytes)),
        },
        None => Err(unrecognised(filename, bytes)),
    }
}

fn unrecognised(filename: &str, bytes: &[u8]) -> DocumentError {
    let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
    DocumentError::decode(format!(
        "'{filename}' is not a supported image or PDF (first bytes: {magic:?})"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([200])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn sniffs_pdf_magic_regardless_of_name() {
        assert_eq!(
            detect_media_kind("scan.png", b"%PDF-1.7\n...").unwrap(),
            MediaKind::Pdf
        );
    }

    #[test]
    fn sniffs_png_regardless_of_name() {
        assert_eq!(
            detect_media_kind("upload.bin", &png_bytes()).unwrap(),
            MediaKind::Image(ImageFormat::Png)
        );
    }

    #[test]
    fn falls_back_to_extension() {
        // Unrecognised magic but a known extension: the decoder gets to decide.
        assert_eq!(
            detect_media_kind("receipt.JPG", b"\x00\x01\x02\x03garbage").unwrap(),
            MediaKind::Image(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn rejects_unknown_bytes_and_extension() {
        let err = detect_media_kind("notes.txt", b"hello world").unwrap_err();
        assert_eq!(err.kind(), "decode_error");
        assert!(err.to_string().contains("notes.txt"));
    }

    #[test]
    fn rejects_empty_upload() {
        let err = detect_media_kind("empty.png", b"").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn media_kind_display() {
        assert_eq!(MediaKind::Pdf.to_string(), "pdf");
        assert_eq!(MediaKind::Image(ImageFormat::Png).to_string(), "png");
    }
}
