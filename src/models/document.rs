use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::approval::Approval;
use super::enums::{DocType, ProcessingMethod};

/// An uploaded supporting document. `(filename, file_hash)` identifies the upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub text_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub doc_type: DocType,
    pub approvals: Vec<Approval>,
    pub file_hash: String,
    pub file_url: Option<String>,
    pub size_bytes: u64,
    pub processing_method: Option<ProcessingMethod>,
}

impl Document {
    /// Images and PDFs count as primary evidence for the compliance review.
    pub fn is_image_or_pdf(&self) -> bool {
        self.mime_type.starts_with("image/") || self.mime_type == "application/pdf"
    }
}
