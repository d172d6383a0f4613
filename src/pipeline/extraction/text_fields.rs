//! Heuristic amount / date / vendor reading from raw OCR text.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::types::{ExtractedItem, OcrSummary};
use crate::models::enums::ProcessingMethod;
use crate::pipeline::normalize::{parse_amount_str, parse_date_str};

/// Characters kept in `textExcerpt`.
pub const EXCERPT_CHARS: usize = 280;

static TOTAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:grand\s+total|total\s+due|amount\s+due|balance\s+due|total)\b[^0-9$€£(\-]*([$€£]?\s?\(?-?\d[\d.,]*\)?)")
        .unwrap()
});

static MONEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£]?\s?\d{1,3}(?:[,.]\d{3})*[.,]\d{2}\b").unwrap()
});

static DATE_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{4}-\d{1,2}-\d{1,2}\b|\b\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b|\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{4}\b",
    )
    .unwrap()
});

static NOT_VENDOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:receipt|invoice|welcome|date|total|subtotal|tel|phone|page|bill to|ship to)\b")
        .unwrap()
});

/// The total the document states. Labelled totals win (last one, since
/// grand totals follow subtotals); otherwise the largest money figure.
pub fn find_total(text: &str) -> Option<f64> {
    let labelled = TOTAL_LINE
        .captures_iter(text)
        .filter_map(|c| parse_amount_str(&c[1]))
        .map(f64::abs)
        .last();
    if labelled.is_some() {
        return labelled;
    }

    MONEY
        .find_iter(text)
        .filter_map(|m| parse_amount_str(m.as_str()))
        .map(f64::abs)
        .fold(None, |best: Option<f64>, v| match best {
            Some(b) if b >= v => Some(b),
            _ => Some(v),
        })
}

/// First date-looking token that parses.
pub fn find_date(text: &str) -> Option<NaiveDate> {
    DATE_CANDIDATE
        .find_iter(text)
        .find_map(|m| parse_date_str(m.as_str()))
}

/// Vendor guess: the first of the top lines that reads like a name.
pub fn find_vendor(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(5)
        .find(|line| {
            let letters = line.chars().filter(|c| c.is_alphabetic()).count();
            let digits = line.chars().filter(|c| c.is_ascii_digit()).count();
            letters >= 3 && digits * 2 < letters && !NOT_VENDOR.is_match(line)
        })
        .map(|line| line.chars().take(60).collect::<String>().trim().to_string())
}

pub fn excerpt(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(EXCERPT_CHARS).collect())
}

/// Read the OCR summary fields from text.
pub fn ocr_summary(text: &str, confidence: Option<f32>) -> OcrSummary {
    OcrSummary {
        amount: find_total(text),
        date: find_date(text),
        vendor: find_vendor(text),
        confidence,
    }
}

/// A single item built from text heuristics, or `None` when no amount was
/// found.
pub fn item_from_text(
    text: &str,
    confidence: Option<f32>,
    method: ProcessingMethod,
) -> Option<ExtractedItem> {
    let summary = ocr_summary(text, confidence);
    // Without an amount there is nothing to match on.
    summary.amount?;
    Some(ExtractedItem {
        kind: None,
        vendor: summary.vendor,
        date: summary.date,
        amount: summary.amount,
        currency: None,
        lines: Vec::new(),
        confidence,
        processing_method: Some(method),
        text_excerpt: excerpt(text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIPT: &str = "STAPLES\n123 Main St\n03/15/2024 10:42\nToner 2 @ 40.00\nSUBTOTAL 1,140.00\nTax 94.56\nTOTAL $1,234.56\nVISA ****1234";

    #[test]
    fn labelled_total_wins_over_subtotal() {
        assert_eq!(find_total(RECEIPT), Some(1234.56));
    }

    #[test]
    fn largest_figure_without_label() {
        assert_eq!(find_total("coffee 3.50\nbagel 12.25\nthanks"), Some(12.25));
        assert_eq!(find_total("no numbers here"), None);
    }

    #[test]
    fn amount_due_label() {
        assert_eq!(find_total("Invoice 1001\nAmount Due: $50.00"), Some(50.0));
    }

    #[test]
    fn date_candidates() {
        assert_eq!(find_date(RECEIPT), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(
            find_date("Issued March 10, 2024 by Acme"),
            NaiveDate::from_ymd_opt(2024, 3, 10)
        );
        assert_eq!(find_date("ref 2024-01-05"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(find_date("99/99/9999"), None);
    }

    #[test]
    fn vendor_is_first_name_like_line() {
        assert_eq!(find_vendor(RECEIPT).as_deref(), Some("STAPLES"));
        assert_eq!(
            find_vendor("RECEIPT\n\nDelta Air Lines\n2024-01-02").as_deref(),
            Some("Delta Air Lines")
        );
        assert_eq!(find_vendor("12345\n$4.00"), None);
    }

    #[test]
    fn item_needs_amount() {
        let item = item_from_text(RECEIPT, Some(0.8), ProcessingMethod::Tesseract).unwrap();
        assert_eq!(item.amount, Some(1234.56));
        assert_eq!(item.vendor.as_deref(), Some("STAPLES"));
        assert_eq!(item.processing_method, Some(ProcessingMethod::Tesseract));
        assert!(item.text_excerpt.unwrap().starts_with("STAPLES"));
        assert!(item_from_text("Just a vendor name", None, ProcessingMethod::Tesseract).is_none());
        assert!(item_from_text("Approved 2024-03-15", None, ProcessingMethod::PlainText).is_none());
    }
}
