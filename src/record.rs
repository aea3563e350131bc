//! The extraction record: one value for each field of a fixed, closed set.
//!
//! [`ExtractionRecord`] has one struct field per invoice field, so a record
//! missing a field cannot be constructed. Values are either a string found in
//! the document or the [`SENTINEL`].

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for a field the model could not determine.
pub const SENTINEL: &str = "NOT FOUND";

/// The closed set of fields extracted from every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvoiceField {
    InvoiceNumber,
    InvoiceDate,
    DueDate,
    Subtotal,
    TaxRate,
    TaxAmount,
    Total,
    BalanceDue,
    Cash,
    Change,
    GstId,
}

impl InvoiceField {
    /// Every field, in wire order.
    pub const ALL: [InvoiceField; 11] = [
        InvoiceField::InvoiceNumber,
        InvoiceField::InvoiceDate,
        InvoiceField::DueDate,
        InvoiceField::Subtotal,
        InvoiceField::TaxRate,
        InvoiceField::TaxAmount,
        InvoiceField::Total,
        InvoiceField::BalanceDue,
        InvoiceField::Cash,
        InvoiceField::Change,
        InvoiceField::GstId,
    ];

    /// The literal JSON key.
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceField::InvoiceNumber => "invoice_number",
            InvoiceField::InvoiceDate => "invoice_date",
            InvoiceField::DueDate => "due_date",
            InvoiceField::Subtotal => "subtotal",
            InvoiceField::TaxRate => "tax_rate",
            InvoiceField::TaxAmount => "tax_amount",
            InvoiceField::Total => "total",
            InvoiceField::BalanceDue => "balance_due",
            InvoiceField::Cash => "cash",
            InvoiceField::Change => "change",
            InvoiceField::GstId => "gst_id",
        }
    }

    /// Look a field up by its JSON key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field value.
///
/// Serialized as a plain string; `NotFound` becomes [`SENTINEL`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    Found(String),
    #[default]
    NotFound,
}

impl FieldValue {
    /// Normalise a raw string: trimmed, empty or sentinel-like input becomes
    /// `NotFound`.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SENTINEL) {
            FieldValue::NotFound
        } else {
            FieldValue::Found(trimmed.to_string())
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FieldValue::Found(_))
    }

    /// The value as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Found(s) => s,
            FieldValue::NotFound => SENTINEL,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = FieldValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string field value")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
                Ok(FieldValue::from_raw(v))
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

/// The structured output of the field extractor.
///
/// Every field is always present; unknown keys never reach this type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionRecord {
    pub invoice_number: FieldValue,
    pub invoice_date: FieldValue,
    pub due_date: FieldValue,
    pub subtotal: FieldValue,
    pub tax_rate: FieldValue,
    pub tax_amount: FieldValue,
    pub total: FieldValue,
    pub balance_due: FieldValue,
    pub cash: FieldValue,
    pub change: FieldValue,
    pub gst_id: FieldValue,
}

impl ExtractionRecord {
    /// A record with every field set to the sentinel.
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn get(&self, field: InvoiceField) -> &FieldValue {
        match field {
            InvoiceField::InvoiceNumber => &self.invoice_number,
            InvoiceField::InvoiceDate => &self.invoice_date,
            InvoiceField::DueDate => &self.due_date,
            InvoiceField::Subtotal => &self.subtotal,
            InvoiceField::TaxRate => &self.tax_rate,
            InvoiceField::TaxAmount => &self.tax_amount,
            InvoiceField::Total => &self.total,
            InvoiceField::BalanceDue => &self.balance_due,
            InvoiceField::Cash => &self.cash,
            InvoiceField::Change => &self.change,
            InvoiceField::GstId => &self.gst_id,
        }
    }

    pub fn set(&mut self, field: InvoiceField, value: FieldValue) {
        let slot = match field {
            InvoiceField::InvoiceNumber => &mut self.invoice_number,
            InvoiceField::InvoiceDate => &mut self.invoice_date,
            InvoiceField::DueDate => &mut self.due_date,
            InvoiceField::Subtotal => &mut self.subtotal,
            InvoiceField::TaxRate => &mut self.tax_rate,
            InvoiceField::TaxAmount => &mut self.tax_amount,
            InvoiceField::Total => &mut self.total,
            InvoiceField::BalanceDue => &mut self.balance_due,
            InvoiceField::Cash => &mut self.cash,
            InvoiceField::Change => &mut self.change,
            InvoiceField::GstId => &mut self.gst_id,
        };
        *slot = value;
    }

    /// `(field, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (InvoiceField, &FieldValue)> {
        InvoiceField::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    /// Number of fields with a real value.
    pub fn found_count(&self) -> usize {
        self.iter().filter(|(_, v)| v.is_found()).count()
    }
}
