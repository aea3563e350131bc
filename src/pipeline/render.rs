//! PDF rasterisation: render the pages of an uploaded PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to drive from async contexts. The caller runs [`render_pdf_pages`] inside
//! `tokio::task::spawn_blocking` together with the rest of the CPU-bound
//! preprocessing.
//!
//! Pages are rendered at `max_width` pixels wide so the preprocessor rarely
//! needs to resample them again.

use crate::config::ExtractorConfig;
use crate::error::DocumentError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Bind to the pdfium shared library.
///
/// Looks in `pdfium_lib_path` when configured, otherwise next to the
/// executable and then on the system library path.
fn bind_pdfium(config: &ExtractorConfig) -> Result<Pdfium, DocumentError> {
    let bindings = match config.pdfium_lib_path {
        Some(ref dir) => {
            let dir = dir.to_string_lossy().into_owned();
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocumentError::PdfUnavailable {
        detail: format!("could not bind to pdfium ({e:?}); set PDFIUM_LIB_PATH"),
    })?;

    Ok(Pdfium::new(bindings))
}

/// Rasterise up to `max_pdf_pages` pages of a PDF held in memory.
///
/// # Returns
/// `(page_num_1based, DynamicImage)` tuples in page order.
pub fn render_pdf_pages(
    filename: &str,
    bytes: &[u8],
    config: &ExtractorConfig,
) -> Result<Vec<(usize, DynamicImage)>, DocumentError> {
    let pdfium = bind_pdfium(config)?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            DocumentError::decode(format!("PDF '{filename}' is encrypted"))
        } else {
            DocumentError::decode(format!("PDF '{filename}' is corrupt: {err_str}"))
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(DocumentError::decode(format!("PDF '{filename}' has no pages")));
    }
    info!("{}: PDF loaded, {} pages", filename, total_pages);

    if total_pages > config.max_pdf_pages {
        warn!(
            "{}: only the first {} of {} pages are processed",
            filename, config.max_pdf_pages, total_pages
        );
    }

    let width = config.max_width as i32;
    let render_config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_maximum_height(width * 4);

    let page_count = total_pages.min(config.max_pdf_pages);
    let mut results = Vec::with_capacity(page_count);

    for idx in 0..page_count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| DocumentError::decode(format!("page {}: {:?}", idx + 1, e)))?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocumentError::decode(format!("rasterisation failed for page {}: {:?}", idx + 1, e))
        })?;

        let image = bitmap.as_image();
        debug!(
            "{}: rendered page {} → {}x{} px",
            filename,
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx + 1, image));
    }

    Ok(results)
}
