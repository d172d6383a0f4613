use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded spreadsheet upload, kept for duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Uuid,
    pub filename: String,
    pub file_hash: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub row_count: usize,
}
