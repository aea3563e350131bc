//! Relevance filter: shrink raw OCR output to the lines worth sending to the model.
//!
//! Receipts carry a lot of noise (addresses, item lists, slogans, barcodes).
//! Only lines mentioning a field label or an amount are kept, plus the first
//! and last few lines for context. Dropping a relevant line here shows up as
//! `NOT FOUND` downstream; that trade-off buys a much smaller, faster prompt.

use crate::config::ExtractorConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Lowercase substrings that mark a line as relevant.
pub const NEEDLES: [&str; 15] = [
    "invoice", "inv#", "no:", "number", "date", "due", "subtotal", "total", "tax", "gst",
    "balance", "cash", "change", "amount", "paid",
];

static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+[.,]\d{2}\b").unwrap());

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

/// Lines selected from the recognized text, in their original order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredText {
    pub lines: Vec<String>,
}

impl FilteredText {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The prompt body: lines joined by newlines, truncated to `max_chars`.
    pub fn to_prompt_text(&self, max_chars: usize) -> String {
        let joined = self.lines.join("\n");
        match joined.char_indices().nth(max_chars) {
            Some((cut, _)) => joined[..cut].to_string(),
            None => joined,
        }
    }
}

/// Whether a line mentions a field label or looks like an amount.
pub fn is_relevant(line: &str) -> bool {
    let lower = line.to_lowercase();
    NEEDLES.iter().any(|n| lower.contains(n)) || RE_AMOUNT.is_match(line)
}

/// Select relevant lines plus `context_lines` of leading/trailing context.
///
/// Blank lines are dropped, runs of spaces/tabs squeezed, and exact
/// duplicates removed (first occurrence wins).
pub fn focus_text(ocr_text: &str, config: &ExtractorConfig) -> FilteredText {
    let lines: Vec<String> = ocr_text
        .lines()
        .map(|l| RE_SPACES.replace_all(l.trim(), " ").into_owned())
        .filter(|l| !l.is_empty())
        .collect();

    let n = lines.len();
    let context = config.context_lines;
    let mut seen = HashSet::new();

    let kept = lines
        .into_iter()
        .enumerate()
        .filter(|(i, line)| *i < context || *i + context >= n || is_relevant(line))
        .map(|(_, line)| line)
        .filter(|line| seen.insert(line.clone()))
        .collect();

    FilteredText { lines: kept }
}
