use crate::models::DocItem;
use crate::pipeline::normalize::to_iso;

/// Line-description vocabulary that marks an item as carrying unallowable cost.
pub const UNALLOWABLE_KEYWORDS: &[&str] = &[
    "alcohol",
    "wine",
    "beer",
    "spirits",
    "liquor",
    "cocktail",
    "entertainment",
    "gift",
    "flowers",
    "golf",
    "country club",
];

/// `vendor | date | $amount | line descriptions`, skipping absent parts.
pub fn doc_summary(item: &DocItem) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(v) = item.vendor.as_deref().filter(|v| !v.trim().is_empty()) {
        parts.push(v.trim().to_string());
    }
    if let Some(d) = &item.date {
        parts.push(to_iso(d));
    }
    if let Some(a) = item.amount {
        parts.push(format!("${a:.2}"));
    }
    let descs: Vec<&str> = item
        .details
        .lines
        .iter()
        .filter_map(|l| l.desc.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();
    if !descs.is_empty() {
        parts.push(descs.join(", "));
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}

/// True iff any line description mentions an unallowable keyword.
pub fn flags_unallowable(item: &DocItem) -> bool {
    item.details
        .lines
        .iter()
        .filter_map(|l| l.desc.as_deref())
        .any(|desc| {
            let lower = desc.to_lowercase();
            UNALLOWABLE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemDetails, LineItem};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn item(lines: &[&str]) -> DocItem {
        DocItem {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            kind: None,
            vendor: Some("Hilton".into()),
            date: NaiveDate::from_ymd_opt(2024, 2, 1),
            amount: Some(400.0),
            currency: None,
            details: ItemDetails {
                lines: lines
                    .iter()
                    .map(|d| LineItem {
                        desc: Some(d.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            },
            text_excerpt: None,
        }
    }

    #[test]
    fn summary_joins_parts() {
        assert_eq!(
            doc_summary(&item(&["Room", "Parking"])).as_deref(),
            Some("Hilton | 2024-02-01 | $400.00 | Room, Parking")
        );
        assert_eq!(
            doc_summary(&item(&[])).as_deref(),
            Some("Hilton | 2024-02-01 | $400.00")
        );
    }

    #[test]
    fn summary_of_empty_item_is_none() {
        let mut empty = item(&[]);
        empty.vendor = None;
        empty.date = None;
        empty.amount = None;
        assert_eq!(doc_summary(&empty), None);
    }

    #[test]
    fn unallowable_lines_flagged() {
        assert!(flags_unallowable(&item(&["Room", "Bottle of WINE"])));
        assert!(flags_unallowable(&item(&["Country Club dues"])));
        assert!(!flags_unallowable(&item(&["Room", "Breakfast"])));
        assert!(!flags_unallowable(&item(&[])));
    }
}
