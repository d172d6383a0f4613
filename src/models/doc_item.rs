use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ItemKind, ProcessingMethod};

/// One structured extraction from a document (e.g. one receipt on a scan).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocItem {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kind: Option<ItemKind>,
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub details: ItemDetails,
    pub text_excerpt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LineItem>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub processing_method: Option<ProcessingMethod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub qty: Option<f64>,
    #[serde(default)]
    pub unit: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
}
