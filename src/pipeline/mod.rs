//! Pipeline stages for receipt/invoice field extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the OCR engine or model server can be swapped
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ preprocess ──▶ ocr ──▶ focus ──▶ llm ──▶ postprocess
//! (sniff)   (pdfium)   (binarise)   (tesseract) (filter) (chat)  (JSON → record)
//! ```
//!
//! 1. [`input`]  — wrap uploaded bytes and sniff the media kind
//! 2. [`render`] — rasterise PDF pages; pdfium is not async-safe
//! 3. [`preprocess`] — grayscale, resize, denoise, Otsu threshold; runs in
//!    `spawn_blocking` together with [`render`]
//! 4. [`ocr`]    — external OCR process per page, bounded by a timeout
//! 5. [`focus`]  — keep only lines that look like invoice fields
//! 6. [`llm`]    — the chat-completion call; the only stage with network I/O
//! 7. [`postprocess`] — recover the JSON object and project it onto the
//!    fixed field set

pub mod focus;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod preprocess;
pub mod render;
