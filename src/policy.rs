//! Receipt / approval requirements per GL line.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{GlEntry, Policy, Thresholds};

const TRAVEL_KEYWORDS: &[&str] = &[
    "travel",
    "airfare",
    "hotel",
    "lodging",
    "mileage",
    "taxi",
    "uber",
    "lyft",
    "rental car",
    "per diem",
    "flight",
];

const MEALS_KEYWORDS: &[&str] = &[
    "meal",
    "food",
    "restaurant",
    "lunch",
    "dinner",
    "breakfast",
    "catering",
];

const SUPPLIES_KEYWORDS: &[&str] = &[
    "supplies",
    "office",
    "stationery",
    "paper",
    "toner",
    "equipment",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyCategory {
    Travel,
    Meals,
    Supplies,
    General,
}

impl PolicyCategory {
    /// Keyword class of the entry's category, falling back to its description.
    pub fn for_entry(entry: &GlEntry) -> Self {
        [entry.category.as_deref(), entry.description.as_deref()]
            .into_iter()
            .flatten()
            .find_map(Self::from_text)
            .unwrap_or(Self::General)
    }

    fn from_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let hit = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if hit(TRAVEL_KEYWORDS) {
            Some(Self::Travel)
        } else if hit(MEALS_KEYWORDS) {
            Some(Self::Meals)
        } else if hit(SUPPLIES_KEYWORDS) {
            Some(Self::Supplies)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Travel => "travel",
            Self::Meals => "meals",
            Self::Supplies => "supplies",
            Self::General => "general",
        }
    }

    fn thresholds<'a>(&self, policy: &'a Policy) -> &'a Thresholds {
        match self {
            Self::Travel => &policy.categories.travel,
            Self::Meals => &policy.categories.meals,
            Self::Supplies => &policy.categories.supplies,
            Self::General => &policy.general,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOutcome {
    pub category: PolicyCategory,
    pub receipt_required: bool,
    pub approval_required: bool,
    pub reasons: Vec<String>,
}

pub fn evaluate(entry: &GlEntry, policy: &Policy) -> PolicyOutcome {
    let category = PolicyCategory::for_entry(entry);
    let thresholds = category.thresholds(policy);
    let amount = entry.amount.abs();
    let waiver = &policy.low_dollar_waiver;
    let waived = waiver.enabled && amount > 0.0 && amount <= waiver.threshold;

    let mut reasons = Vec::new();
    let receipt_required = !waived && amount >= thresholds.receipt_threshold;
    let approval_required = !waived && amount >= thresholds.approval_threshold;

    if waived {
        reasons.push(format!(
            "${amount:.2} is within the low-dollar waiver (≤ ${:.2})",
            waiver.threshold
        ));
    } else {
        if receipt_required {
            reasons.push(format!(
                "Receipt required: ${amount:.2} ≥ {} receipt threshold ${:.2}",
                category.as_str(),
                thresholds.receipt_threshold
            ));
        }
        if approval_required {
            reasons.push(format!(
                "Approval required: ${amount:.2} ≥ {} approval threshold ${:.2}",
                category.as_str(),
                thresholds.approval_threshold
            ));
        }
        if !receipt_required && !approval_required {
            reasons.push(format!(
                "${amount:.2} is below the {} receipt threshold ${:.2}",
                category.as_str(),
                thresholds.receipt_threshold
            ));
        }
    }

    if category == PolicyCategory::Travel {
        reasons.push("Travel costs are governed by FAR 31.205-46".to_string());
    }

    PolicyOutcome {
        category,
        receipt_required,
        approval_required,
        reasons,
    }
}

/// Policy outcome for one GL line, with what is still missing given its
/// current attachments and approvals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub gl_entry_id: Uuid,
    #[serde(flatten)]
    pub outcome: PolicyOutcome,
    pub receipt_missing: bool,
    pub approval_missing: bool,
}

pub fn requirements<'a>(
    entries: impl IntoIterator<Item = &'a GlEntry>,
    policy: &Policy,
) -> Vec<Requirement> {
    entries
        .into_iter()
        .map(|entry| {
            let outcome = evaluate(entry, policy);
            Requirement {
                gl_entry_id: entry.id,
                receipt_missing: outcome.receipt_required && !entry.has_receipt,
                approval_missing: outcome.approval_required && !entry.has_approval,
                outcome,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewGlEntry;
    use chrono::Utc;

    fn entry(description: &str, category: Option<&str>, amount: f64) -> GlEntry {
        GlEntry::from_new(
            Uuid::new_v4(),
            NewGlEntry {
                description: Some(description.into()),
                category: category.map(str::to_string),
                amount,
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn category_prefers_category_field() {
        let e = entry("Team lunch", Some("Travel"), 10.0);
        assert_eq!(PolicyCategory::for_entry(&e), PolicyCategory::Travel);
        let e = entry("Team lunch", Some("Misc"), 10.0);
        assert_eq!(PolicyCategory::for_entry(&e), PolicyCategory::Meals);
        let e = entry("Toner cartridges", None, 10.0);
        assert_eq!(PolicyCategory::for_entry(&e), PolicyCategory::Supplies);
        let e = entry("Consulting", None, 10.0);
        assert_eq!(PolicyCategory::for_entry(&e), PolicyCategory::General);
    }

    #[test]
    fn travel_thresholds_and_citation() {
        let policy = Policy::default();
        let out = evaluate(&entry("Hotel", None, 1_200.0), &policy);
        assert_eq!(out.category, PolicyCategory::Travel);
        assert!(out.receipt_required);
        assert!(out.approval_required);
        assert!(out.reasons.iter().any(|r| r.contains("31.205-46")));
        assert!(out.reasons.iter().any(|r| r.contains("$1000.00")));
    }

    #[test]
    fn receipt_threshold_is_inclusive() {
        let policy = Policy::default();
        assert!(evaluate(&entry("Consulting", None, 75.0), &policy).receipt_required);
        assert!(!evaluate(&entry("Consulting", None, 74.99), &policy).receipt_required);
        assert!(!evaluate(&entry("Paper", None, 99.0), &policy).receipt_required);
    }

    #[test]
    fn low_dollar_waiver_forces_false() {
        let mut policy = Policy::default();
        policy.general.receipt_threshold = 10.0;
        let out = evaluate(&entry("Consulting", None, 20.0), &policy);
        assert!(!out.receipt_required);
        assert!(out.reasons[0].contains("waiver"));

        policy.low_dollar_waiver.enabled = false;
        assert!(evaluate(&entry("Consulting", None, 20.0), &policy).receipt_required);
    }

    #[test]
    fn zero_amount_not_waived() {
        let mut policy = Policy::default();
        policy.general.receipt_threshold = 0.0;
        assert!(evaluate(&entry("Consulting", None, 0.0), &policy).receipt_required);
    }

    #[test]
    fn requirements_report_missing_evidence() {
        let policy = Policy::default();
        let mut covered = entry("Hotel", None, 400.0);
        covered.has_receipt = true;
        covered.attachments_count = 1;
        let bare = entry("Hotel", None, 400.0);
        let reqs = requirements([&covered, &bare], &policy);
        assert!(!reqs[0].receipt_missing);
        assert!(reqs[1].receipt_missing);
        assert!(!reqs[1].approval_missing);

        let json = serde_json::to_value(&reqs[1]).unwrap();
        assert_eq!(json["receiptRequired"], true);
        assert_eq!(json["category"], "travel");
    }
}
