use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asserted relation between a document item and the GL line it supports.
/// Keyed on `(document_item_id, gl_entry_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlDocLink {
    pub document_item_id: Uuid,
    pub gl_entry_id: Uuid,
    /// Match strength in `[0, 1]`.
    pub score: f64,
    pub doc_summary: Option<String>,
    pub doc_flag_unallowable: bool,
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
}

/// Structured difference between an item and the GL line it was linked to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum Discrepancy {
    #[serde(rename_all = "camelCase")]
    Amount {
        item_amount: f64,
        gl_amount: f64,
        absolute: f64,
        percent: f64,
    },
    #[serde(rename_all = "camelCase")]
    Date {
        item_date: NaiveDate,
        gl_date: NaiveDate,
        /// Item date minus GL date, in days.
        days: i64,
    },
    #[serde(rename_all = "camelCase")]
    Vendor {
        item_vendor: String,
        gl_vendor: String,
        similarity: f64,
    },
}
