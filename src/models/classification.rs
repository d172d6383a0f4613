use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ClassificationLabel;

/// Compliance verdict for one GL row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub index: usize,
    pub id: Option<Uuid>,
    pub classification: ClassificationLabel,
    /// At most 160 characters.
    pub rationale: String,
    /// `31.xxx` section or empty.
    pub far_section: String,
}
