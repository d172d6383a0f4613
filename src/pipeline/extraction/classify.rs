use crate::models::enums::{DocType, ItemKind};

use super::types::ExtractedItem;

const INVOICE_KEYWORDS: &[&str] = &[
    "invoice",
    "bill to",
    "amount due",
    "remit to",
    "net 30",
    "purchase order",
];
const RECEIPT_KEYWORDS: &[&str] = &[
    "receipt",
    "thank you",
    "change due",
    "cashier",
    "subtotal",
    "visa",
    "paid",
];
const TIMESHEET_KEYWORDS: &[&str] = &["timesheet", "time sheet", "hours worked", "overtime", "pay period"];
const ORG_CHART_KEYWORDS: &[&str] = &["org chart", "organization chart", "organizational chart", "reports to"];
const APPROVAL_KEYWORDS: &[&str] = &[
    "approved by",
    "authorized by",
    "ok to pay",
    "payment approved",
    "sign-off",
    "signoff",
];

/// Words that signal an approval decision anywhere in the text.
const DECISION_KEYWORDS: &[&str] = &[
    "approved",
    "approve",
    "authorized",
    "rejected",
    "denied",
    "declined",
];

/// Candidate types in tie-break order.
const CANDIDATES: [(DocType, &[&str]); 5] = [
    (DocType::Invoice, INVOICE_KEYWORDS),
    (DocType::Receipt, RECEIPT_KEYWORDS),
    (DocType::Timesheet, TIMESHEET_KEYWORDS),
    (DocType::OrgChart, ORG_CHART_KEYWORDS),
    (DocType::ApprovalNote, APPROVAL_KEYWORDS),
];

fn filename_tokens(filename: &str) -> Vec<String> {
    let lower = filename.to_lowercase();
    let stem = lower.rsplit_once('.').map(|(s, _)| s).unwrap_or(&lower);
    stem.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn filename_hint(doc_type: DocType, tokens: &[String]) -> bool {
    let hints: &[&str] = match doc_type {
        DocType::Invoice => &["invoice", "inv", "bill"],
        DocType::Receipt => &["receipt", "rcpt", "folio"],
        DocType::Timesheet => &["timesheet", "hours"],
        DocType::OrgChart => &["orgchart", "org"],
        DocType::ApprovalNote => &["approval", "approved", "authorization", "memo"],
        DocType::Unknown => &[],
    };
    tokens.iter().any(|t| hints.contains(&t.as_str()))
}

/// Classify a document from item kinds (+3 each type seen), filename tokens
/// (+2) and text keywords (+1 per keyword present).
pub fn classify_document(items: &[ExtractedItem], filename: &str, text: Option<&str>) -> DocType {
    let lower = text.map(str::to_lowercase).unwrap_or_default();
    let tokens = filename_tokens(filename);

    let mut best = (DocType::Unknown, 0);
    for (doc_type, keywords) in CANDIDATES {
        let mut score = 0;
        let kind = match doc_type {
            DocType::Invoice => Some(ItemKind::Invoice),
            DocType::Receipt => Some(ItemKind::Receipt),
            _ => None,
        };
        if kind.is_some() && items.iter().any(|i| i.kind == kind) {
            score += 3;
        }
        if filename_hint(doc_type, &tokens) {
            score += 2;
        }
        score += keywords.iter().filter(|k| lower.contains(*k)).count();

        if score > best.1 {
            best = (doc_type, score);
        }
    }

    if best.0 == DocType::Unknown && has_decision_keywords(&lower) {
        return DocType::ApprovalNote;
    }
    best.0
}

fn has_decision_keywords(lower: &str) -> bool {
    DECISION_KEYWORDS.iter().any(|k| lower.contains(k))
}
