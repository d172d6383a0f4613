use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MatchQuality;

/// A general-ledger expense line under audit.
///
/// Everything below `created_at` is derived from links and direct
/// attachments and is rewritten by `EntityStore::recompute_derived_flags`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlEntry {
    pub id: Uuid,
    pub account_number: Option<String>,
    pub description: Option<String>,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub contract_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub doc_summary: Option<String>,
    pub doc_flag_unallowable: bool,
    pub attachments_count: u32,
    pub has_receipt: bool,
    pub approvals_count: u32,
    pub has_approval: bool,
    pub attached_documents: Vec<DocAttachment>,
    pub document_match_quality: Option<MatchQuality>,
}

/// A document attached straight to a GL line, without an extracted item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocAttachment {
    pub document_id: Uuid,
    pub filename: String,
    pub mime_type: String,
}

/// Canonical GL row before it is assigned an id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGlEntry {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub contract_number: Option<String>,
}

impl GlEntry {
    pub fn from_new(id: Uuid, row: NewGlEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            account_number: row.account_number,
            description: row.description,
            amount: row.amount,
            date: row.date,
            category: row.category,
            vendor: row.vendor,
            contract_number: row.contract_number,
            created_at,
            doc_summary: None,
            doc_flag_unallowable: false,
            attachments_count: 0,
            has_receipt: false,
            approvals_count: 0,
            has_approval: false,
            attached_documents: Vec::new(),
            document_match_quality: None,
        }
    }
}
