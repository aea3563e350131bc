//! Bitmap normalisation: turn a decoded page into an OCR-ready bitmap.
//!
//! Tesseract is most accurate on clean black-on-white text at a moderate
//! resolution. Every page goes through the same four steps:
//!
//! 1. grayscale
//! 2. resize into the `[upscale_min_width, max_width]` band (big scans are
//!    downscaled, tiny receipts gently upscaled)
//! 3. light Gaussian denoise
//! 4. Otsu global binarisation
//!
//! The work is CPU-bound; callers run [`preprocess_document`] on the blocking
//! pool.

use crate::config::ExtractorConfig;
use crate::error::DocumentError;
use crate::pipeline::input::{Document, MediaKind};
use crate::pipeline::render;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

/// A preprocessed page, ready for the text recognizer.
#[derive(Debug, Clone)]
pub struct CanonicalBitmap {
    /// 1-based page number within the source document.
    pub page: usize,
    pub image: GrayImage,
}

/// Decode a document and normalise each of its pages.
///
/// Images yield one bitmap; PDFs yield one per rendered page.
pub fn preprocess_document(
    document: &Document,
    config: &ExtractorConfig,
) -> Result<Vec<CanonicalBitmap>, DocumentError> {
    let kind = document.media_kind()?;
    debug!("{}: detected {}", document.filename, kind);

    let pages = match kind {
        MediaKind::Image(format) => {
            let img = image::load_from_memory_with_format(&document.bytes, format).map_err(|e| {
                DocumentError::decode(format!("could not decode '{}': {e}", document.filename))
            })?;
            vec![(1, img)]
        }
        MediaKind::Pdf => render::render_pdf_pages(&document.filename, &document.bytes, config)?,
    };

    Ok(pages
        .into_iter()
        .map(|(page, img)| CanonicalBitmap {
            page,
            image: normalize(&img, config),
        })
        .collect())
}

/// Grayscale, resize, denoise and binarise one page.
pub fn normalize(img: &DynamicImage, config: &ExtractorConfig) -> GrayImage {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();

    let gray = match target_size(w, h, config) {
        Some((nw, nh)) => {
            debug!("resize {}x{} → {}x{}", w, h, nw, nh);
            let filter = if nw < w {
                FilterType::Triangle
            } else {
                FilterType::CatmullRom
            };
            imageops::resize(&gray, nw, nh, filter)
        }
        None => gray,
    };

    let gray = if config.blur_sigma > 0.0 {
        gaussian_blur_f32(&gray, config.blur_sigma)
    } else {
        gray
    };

    binarize(&gray)
}

/// New dimensions for a `w`×`h` page, or `None` if it is already in band.
fn target_size(w: u32, h: u32, config: &ExtractorConfig) -> Option<(u32, u32)> {
    if w == 0 || h == 0 {
        return None;
    }
    let scale = if w > config.max_width {
        config.max_width as f32 / w as f32
    } else if w < config.upscale_min_width {
        config.upscale_factor
    } else {
        return None;
    };
    if scale == 1.0 {
        return None;
    }
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    Some((nw, nh))
}

/// Otsu global binarisation: pixels above the level become white, the rest
/// black.
pub fn binarize(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    threshold(img, level, ThresholdType::Binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn binarize_separates_two_populations() {
        // Left half dark text-ish pixels, right half light paper.
        let img = GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([40]) } else { Luma([210]) });
        let bw = binarize(&img);
        assert_eq!(bw.get_pixel(0, 0)[0], 0);
        assert_eq!(bw.get_pixel(19, 9)[0], 255);
    }

    #[test]
    fn normalized_output_is_strictly_binary() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(900, 300, |x, y| {
            let v = ((x * 7 + y * 3) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        }));
        let out = normalize(&img, &ExtractorConfig::default());
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn wide_scans_are_downscaled_to_max_width() {
        let config = ExtractorConfig::default();
        assert_eq!(target_size(2800, 4000, &config), Some((1400, 2000)));
    }

    #[test]
    fn narrow_receipts_are_upscaled() {
        let config = ExtractorConfig::default();
        assert_eq!(target_size(400, 1000, &config), Some((600, 1500)));
    }

    #[test]
    fn in_band_widths_are_untouched() {
        let config = ExtractorConfig::default();
        assert_eq!(target_size(1000, 1400, &config), None);
        assert_eq!(target_size(800, 10, &config), None);
        assert_eq!(target_size(1400, 10, &config), None);
    }

    #[test]
    fn preprocess_decodes_png_into_one_page() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 50, Luma([180])));
        let doc = Document::new("r.png", encode(&img, ImageFormat::Png));
        let bitmaps = preprocess_document(&doc, &ExtractorConfig::default()).unwrap();
        assert_eq!(bitmaps.len(), 1);
        assert_eq!(bitmaps[0].page, 1);
        assert_eq!(bitmaps[0].image.dimensions(), (150, 75));
    }

    #[test]
    fn preprocess_accepts_bmp() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(900, 20, Rgb([10, 10, 10])));
        let doc = Document::new("scan.bmp", encode(&img, ImageFormat::Bmp));
        let bitmaps = preprocess_document(&doc, &ExtractorConfig::default()).unwrap();
        assert_eq!(bitmaps[0].image.width(), 900);
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([90])));
        let mut bytes = encode(&img, ImageFormat::Png);
        bytes.truncate(40);
        let doc = Document::new("broken.png", bytes);
        let err = preprocess_document(&doc, &ExtractorConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "decode_error");
    }
}
