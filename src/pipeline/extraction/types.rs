use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExtractionError;
use crate::models::enums::{DocType, ItemKind, ProcessingMethod};
use crate::models::{Approval, DocItem, ItemDetails, LineItem};

/// Raw OCR result from the engine
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean word confidence, 0.0-1.0.
    pub confidence: f32,
    pub words: Vec<OcrWord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn ocr(&self, bytes: &[u8], mime_type: &str) -> Result<OcrPageResult, ExtractionError>;
}

/// Prebuilt document-intelligence models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiModel {
    Invoice,
    Receipt,
    Layout,
}

impl DiModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            DiModel::Invoice => "prebuilt-invoice",
            DiModel::Receipt => "prebuilt-receipt",
            DiModel::Layout => "prebuilt-layout",
        }
    }

    /// Filename hint first, then images default to receipts.
    pub fn for_document(filename: &str, mime_type: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.contains("invoice") || lower.contains("inv_") || lower.contains("inv-") {
            DiModel::Invoice
        } else if lower.contains("receipt") || lower.contains("rcpt") {
            DiModel::Receipt
        } else if mime_type.starts_with("image/") {
            DiModel::Receipt
        } else {
            DiModel::Layout
        }
    }
}

/// Document-intelligence collaborator. Returns the `analyzeResult` object
/// of a succeeded operation.
pub trait DocumentIntelligence: Send + Sync {
    fn analyze(
        &self,
        bytes: &[u8],
        mime_type: &str,
        model: DiModel,
    ) -> Result<serde_json::Value, ExtractionError>;
}

/// An item extracted from a document before it is given ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedItem {
    pub kind: Option<ItemKind>,
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LineItem>,
    pub confidence: Option<f32>,
    pub processing_method: Option<ProcessingMethod>,
    pub text_excerpt: Option<String>,
}

impl ExtractedItem {
    /// True when the item carries anything worth matching on.
    pub fn has_fields(&self) -> bool {
        self.amount.is_some() || self.vendor.is_some() || self.date.is_some()
    }

    pub fn into_doc_item(self, document_id: Uuid) -> DocItem {
        DocItem {
            id: Uuid::new_v4(),
            document_id,
            kind: self.kind,
            vendor: self.vendor,
            date: self.date,
            amount: self.amount,
            currency: self.currency,
            details: ItemDetails {
                lines: self.lines,
                confidence: self.confidence,
                processing_method: self.processing_method,
            },
            text_excerpt: self.text_excerpt,
        }
    }
}

/// Heuristic receipt fields read from OCR text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrSummary {
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub confidence: Option<f32>,
}

/// Outcome of one extraction step, for logs and the ingest response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step: String,
    pub ok: bool,
    pub items: usize,
    pub message: Option<String>,
}

/// Everything extraction learned about one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutput {
    /// Aggregated text of every step that produced any; `None` if none did.
    pub text: Option<String>,
    pub items: Vec<ExtractedItem>,
    pub approvals: Vec<Approval>,
    pub doc_type: DocType,
    pub processing_method: Option<ProcessingMethod>,
    pub ocr: Option<OcrSummary>,
    pub steps: Vec<StepReport>,
}

impl ExtractionOutput {
    pub fn empty() -> Self {
        Self {
            text: None,
            items: Vec::new(),
            approvals: Vec::new(),
            doc_type: DocType::Unknown,
            processing_method: None,
            ocr: None,
            steps: Vec::new(),
        }
    }
}
