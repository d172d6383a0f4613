use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::Decision;

/// An approval decision mined from document text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approver: Option<String>,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub decision: Decision,
    pub comments: Option<String>,
    pub target_type: Option<String>,
    pub summary: Option<String>,
    pub confidence: f32,
}
