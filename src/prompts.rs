//! Prompts for LLM-based invoice field extraction.
//!
//! Callers can override the system message via
//! [`crate::config::ExtractorConfig::system_prompt`]; the user message is
//! always built by [`extraction_prompt`] because the reply parser depends on
//! the key list it names.

use crate::record::{InvoiceField, SENTINEL};

/// Default system prompt for the extraction call.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a precise invoice extraction assistant. Respond with JSON only.";

/// Build the user message for one document's filtered text.
pub fn extraction_prompt(invoice_text: &str) -> String {
    let keys = InvoiceField::ALL
        .iter()
        .map(|f| format!("\"{}\"", f.as_str()))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "Extract the following fields from the invoice text and return ONLY a JSON object \
with exactly these keys:\n\
[{keys}]\n\
If a field is unknown, use \"{SENTINEL}\". If a date appears with no label, assume it is the invoice_date.\n\
\n\
Invoice Text:\n\
------\n\
{invoice_text}\n\
------"
    )
}
