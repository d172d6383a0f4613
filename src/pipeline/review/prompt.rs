use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::ProcessingMethod;
use crate::models::GlEntry;
use crate::pipeline::llm::{ChatMessage, ChatRequest};

/// Linked items sent per row.
pub const MAX_ATTACHMENTS_PER_ROW: usize = 5;

pub const REVIEW_SYSTEM_PROMPT: &str = r#"You are a U.S. government contract cost auditor applying FAR Part 31 (cost principles) to general-ledger expense lines.

For each row decide exactly one classification:
- ALLOWED: reasonable, allocable, allowable under FAR 31.201-2 and adequately supported.
- UNALLOWABLE: expressly unallowable under a FAR 31.205 cost principle.
- NEEDS_REVIEW: allowability depends on facts not in the row or its attachments.
- RECEIPT_REQUIRED: potentially allowable but lacks required supporting documentation.

Decision logic, applied in order by cost category:
1. Alcoholic beverages (wine, beer, liquor, spirits, cocktails, bar tabs): UNALLOWABLE, 31.205-51.
2. Entertainment, amusement, diversion, social activities, tickets, golf, country club: UNALLOWABLE, 31.205-14.
3. Gifts, flowers, donations: UNALLOWABLE, 31.205-13 or 31.205-8.
4. Fines and penalties: UNALLOWABLE, 31.205-15. Lobbying: UNALLOWABLE, 31.205-22. Interest: UNALLOWABLE, 31.205-20.
5. Travel, lodging, airfare, mileage, per diem: 31.205-46. RECEIPT_REQUIRED when hasReceipt is false or attachmentsCount is 0; NEEDS_REVIEW when lodging or meals may exceed per-diem limits; otherwise ALLOWED.
6. Meals with clients or business guests: NEEDS_REVIEW under 31.205-14 unless clearly travel subsistence (31.205-46).
7. Office supplies, materials, equipment: 31.205-26 or 31.205-11; RECEIPT_REQUIRED without a receipt, otherwise ALLOWED.
8. Anything else: ALLOWED with the most specific 31.2xx citation when supported, NEEDS_REVIEW when unclear.

Use attachments (OCR amount, date, vendor) to confirm support. A receipt whose amount or vendor contradicts the row is NEEDS_REVIEW.

Respond with strict JSON only, no prose, no code fences, in exactly this shape:
{"results":[{"index":<row index>,"id":"<row id>","classification":"ALLOWED|UNALLOWABLE|NEEDS_REVIEW|RECEIPT_REQUIRED","rationale":"<at most 160 characters>","farSection":"31.xxx or empty string"}]}
Return one result per input row, using the row's own index."#;

const CONTINUATION_SYSTEM_SUFFIX: &str = "\n\nThis is a continuation. Return results ONLY for the rows in this message. Do not repeat any of these already-returned indices: ";

/// A GL row submitted for review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRow {
    #[serde(default)]
    pub id: Option<Uuid>,
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
    #[serde(default)]
    pub attachments_count: u32,
    #[serde(default)]
    pub has_receipt: bool,
}

impl From<&GlEntry> for ReviewRow {
    fn from(gl: &GlEntry) -> Self {
        Self {
            id: Some(gl.id),
            account_number: gl.account_number.clone(),
            description: gl.description.clone(),
            amount: gl.amount,
            date: gl.date,
            category: gl.category.clone(),
            vendor: gl.vendor.clone(),
            contract_number: gl.contract_number.clone(),
            attachments_count: gl.attachments_count,
            has_receipt: gl.has_receipt,
        }
    }
}

/// OCR-level fields of a linked item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrFields {
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub confidence: Option<f32>,
}

/// One linked document item as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub document_item_id: Uuid,
    pub document_id: Uuid,
    pub processing_method: ProcessingMethod,
    pub ocr: OcrFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_full: Option<String>,
}

/// A row as it appears in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRow {
    pub index: usize,
    pub id: Option<Uuid>,
    pub account_number: Option<String>,
    pub description: Option<String>,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub contract_number: Option<String>,
    pub attachments_count: u32,
    pub has_receipt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentSummary>>,
}

impl PromptRow {
    pub fn new(index: usize, row: &ReviewRow, mut attachments: Vec<AttachmentSummary>) -> Self {
        attachments.truncate(MAX_ATTACHMENTS_PER_ROW);
        Self {
            index,
            id: row.id,
            account_number: row.account_number.clone(),
            description: row.description.clone(),
            amount: row.amount,
            date: row.date,
            category: row.category.clone(),
            vendor: row.vendor.clone(),
            contract_number: row.contract_number.clone(),
            attachments_count: row.attachments_count,
            has_receipt: row.has_receipt,
            attachments: (!attachments.is_empty()).then_some(attachments),
        }
    }
}

#[derive(Serialize)]
struct RowsPayload<'a> {
    rows: &'a [PromptRow],
}

/// `clamp(60·rows + 300, 800, 8000)`
pub fn initial_max_tokens(rows: usize) -> u32 {
    (rows as u32).saturating_mul(60).saturating_add(300).clamp(800, 8000)
}

/// `clamp(60·missing + 200, 600, 8000)`
pub fn continuation_max_tokens(missing: usize) -> u32 {
    (missing as u32).saturating_mul(60).saturating_add(200).clamp(600, 8000)
}

pub fn rows_message(rows: &[PromptRow]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&RowsPayload { rows })
}

pub fn build_initial_request(rows: &[PromptRow]) -> Result<ChatRequest, serde_json::Error> {
    Ok(ChatRequest::new(
        vec![
            ChatMessage::system(REVIEW_SYSTEM_PROMPT),
            ChatMessage::user(rows_message(rows)?),
        ],
        initial_max_tokens(rows.len()),
    ))
}

/// Request for the still-missing rows; `returned` lists indices already answered.
pub fn build_continuation_request(
    missing: &[PromptRow],
    returned: &[usize],
) -> Result<ChatRequest, serde_json::Error> {
    let listed = returned
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let system = format!("{REVIEW_SYSTEM_PROMPT}{CONTINUATION_SYSTEM_SUFFIX}[{listed}]");
    Ok(ChatRequest::new(
        vec![
            ChatMessage::system(system),
            ChatMessage::user(rows_message(missing)?),
        ],
        continuation_max_tokens(missing.len()),
    ))
}
