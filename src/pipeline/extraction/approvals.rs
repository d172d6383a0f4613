//! Approval decisions mined from free text.
//!
//! Three passes run over the lines of a document:
//! 1. single-line statements: "Approved by Jane Doe, CFO on 03/15/2024"
//! 2. blocks opened by a bare "Approved by:" with name / title / date on
//!    the following lines
//! 3. bare decision hints ("OK to pay", "payment approved", "denied")
//!
//! Results are de-duplicated on (approver, date, decision).

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::text_fields::find_date;
use crate::models::enums::Decision;
use crate::models::Approval;

/// Lines after an "Approved by:" header that belong to its block.
const BLOCK_LINES: usize = 3;
const SUMMARY_CHARS: usize = 160;
const MAX_CONFIDENCE: f32 = 0.95;

static APPROVAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(approved|reviewed|authori[sz]ed|rejected|denied|declined)\s+by)\s*:?\s*([A-Z][A-Za-z.'\-]*(?:[ \t]+[A-Z][A-Za-z.'\-]*){0,3})(.*)$",
    )
    .unwrap()
});

static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(approved|authori[sz]ed)\s+by\s*:\s*$").unwrap()
});

static FIELD_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:name|title|position|date|signed)\s*:\s*").unwrap()
});

static APPROVE_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bok(?:ay)?\s+to\s+pay\b|\bpayment\s+approved\b").unwrap());

static REJECT_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:denied|rejected|declined)\b").unwrap());

const TARGET_TYPES: &[(&str, &str)] = &[
    ("expense report", "expenseReport"),
    ("purchase order", "purchaseOrder"),
    ("timesheet", "timesheet"),
    ("invoice", "invoice"),
    ("travel", "travel"),
    ("reimbursement", "reimbursement"),
    ("payment", "payment"),
];

fn decision_for(verb: &str) -> Decision {
    match verb.to_lowercase().as_str() {
        "approved" | "authorized" | "authorised" => Decision::Approved,
        "rejected" | "denied" | "declined" => Decision::Rejected,
        _ => Decision::Unknown,
    }
}

fn target_type(line: &str, full_text: &str) -> Option<String> {
    let find = |s: &str| {
        let lower = s.to_lowercase();
        TARGET_TYPES
            .iter()
            .find(|(kw, _)| lower.contains(kw))
            .map(|(_, t)| t.to_string())
    };
    find(line).or_else(|| find(full_text))
}

fn summary(line: &str) -> Option<String> {
    let trimmed = line.trim();
    (!trimmed.is_empty()).then(|| trimmed.chars().take(SUMMARY_CHARS).collect())
}

fn confidence(date: bool, title: bool, block: bool) -> f32 {
    let mut c = 0.5;
    if date {
        c += 0.2;
    }
    if title {
        c += 0.1;
    }
    if block {
        c += 0.1;
    }
    f32::min(c, MAX_CONFIDENCE)
}

/// Title after a `,` / `-` separator, up to " on " or the next comma.
fn title_from_rest(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let after = rest
        .strip_prefix(',')
        .or_else(|| rest.strip_prefix(" -"))
        .or_else(|| rest.strip_prefix('-'))
        .or_else(|| rest.strip_prefix('–'))?;
    let lower = after.to_ascii_lowercase();
    let end = [lower.find(" on "), after.find(',')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(after.len());
    let title = after[..end].trim().trim_end_matches('.').trim();
    let usable = !title.is_empty()
        && title.chars().any(char::is_alphabetic)
        && find_date(title).is_none();
    usable.then(|| title.to_string())
}

fn approval(
    approver: Option<String>,
    title: Option<String>,
    date: Option<NaiveDate>,
    decision: Decision,
    line: &str,
    full_text: &str,
    block: bool,
) -> Approval {
    Approval {
        confidence: confidence(date.is_some(), title.is_some(), block),
        approver,
        title,
        date,
        decision,
        comments: None,
        target_type: target_type(line, full_text),
        summary: summary(line),
    }
}

fn single_line(line: &str, full_text: &str) -> Option<Approval> {
    let caps = APPROVAL_LINE.captures(line)?;
    let decision = decision_for(&caps[1]);
    let name = caps[2].trim().trim_end_matches('.').to_string();
    let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    let title = title_from_rest(rest);
    let date = find_date(rest);
    Some(approval(
        Some(name),
        title,
        date,
        decision,
        line,
        full_text,
        false,
    ))
}

fn block(lines: &[&str], start: usize, full_text: &str) -> Option<(Approval, usize)> {
    let header = lines[start];
    let verb = BLOCK_HEADER.captures(header)?.get(1)?.as_str().to_string();

    let following: Vec<(usize, &str)> = lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .map(|(i, l)| (i, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .take(BLOCK_LINES)
        .collect();

    let mut approver = None;
    let mut title = None;
    let mut date = None;
    let mut last = start;
    for (i, raw) in following {
        let value = FIELD_LABEL.replace(raw, "");
        let value = value.trim();
        if let Some(d) = find_date(value) {
            if date.is_none() {
                date = Some(d);
                last = i;
            }
        } else if approver.is_none() {
            approver = Some(value.to_string());
            last = i;
        } else if title.is_none() {
            title = Some(value.to_string());
            last = i;
        }
    }

    approver.as_ref()?;
    let summary_line = lines[start..=last].join(" ");
    Some((
        approval(
            approver,
            title,
            date,
            decision_for(&verb),
            &summary_line,
            full_text,
            true,
        ),
        last,
    ))
}

fn hint(line: &str, full_text: &str) -> Option<Approval> {
    let decision = if APPROVE_HINT.is_match(line) {
        Decision::Approved
    } else if REJECT_HINT.is_match(line) {
        Decision::Rejected
    } else {
        return None;
    };
    let mut found = approval(
        None,
        None,
        find_date(line),
        decision,
        line,
        full_text,
        false,
    );
    found.comments = summary(line);
    Some(found)
}

/// Mine every approval statement in `text`.
pub fn extract_approvals(text: &str) -> Vec<Approval> {
    let lines: Vec<&str> = text.lines().collect();
    let mut found = Vec::new();
    let mut consumed: HashSet<usize> = HashSet::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(a) = single_line(line, text) {
            found.push(a);
            consumed.insert(i);
        }
    }

    let mut i = 0;
    while i < lines.len() {
        if !consumed.contains(&i) {
            if let Some((a, last)) = block(&lines, i, text) {
                found.push(a);
                consumed.extend(i..=last);
                i = last + 1;
                continue;
            }
        }
        i += 1;
    }

    for (i, line) in lines.iter().enumerate() {
        if consumed.contains(&i) {
            continue;
        }
        if let Some(a) = hint(line, text) {
            found.push(a);
        }
    }

    dedupe(found)
}

fn dedupe(approvals: Vec<Approval>) -> Vec<Approval> {
    let mut seen = HashSet::new();
    approvals
        .into_iter()
        .filter(|a| {
            let key = (
                a.approver.as_deref().unwrap_or("").to_lowercase(),
                a.date,
                a.decision,
            );
            seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_with_title_and_date() {
        let approvals = extract_approvals("Approved by Jane Doe, CFO on 03/15/2024");
        assert_eq!(approvals.len(), 1);
        let a = &approvals[0];
        assert_eq!(a.approver.as_deref(), Some("Jane Doe"));
        assert_eq!(a.title.as_deref(), Some("CFO"));
        assert_eq!(a.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(a.decision, Decision::Approved);
        assert!((a.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn non_ascii_title_is_sliced_on_char_boundary() {
        let approvals = extract_approvals("Approved by Jane Doe, \u{212A}\u{20AC} on 03/15/2024");
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].title.as_deref(), Some("\u{212A}\u{20AC}"));
        assert_eq!(approvals[0].date, NaiveDate::from_ymd_opt(2024, 3, 15));

        let approvals = extract_approvals("Approved by Jane Doe, Directrice Générale on 2024-03-15");
        assert_eq!(approvals[0].title.as_deref(), Some("Directrice Générale"));
    }

    #[test]
    fn reviewed_is_unknown_decision() {
        let approvals = extract_approvals("Reviewed by: John Smith");
        assert_eq!(approvals[0].decision, Decision::Unknown);
        assert_eq!(approvals[0].approver.as_deref(), Some("John Smith"));
        assert_eq!(approvals[0].date, None);
        assert!((approvals[0].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn lowercase_on_not_swallowed_into_name() {
        let approvals = extract_approvals("Authorized by Mary Major on March 3, 2024 for travel");
        assert_eq!(approvals[0].approver.as_deref(), Some("Mary Major"));
        assert_eq!(approvals[0].date, NaiveDate::from_ymd_opt(2024, 3, 3));
        assert_eq!(approvals[0].target_type.as_deref(), Some("travel"));
    }

    #[test]
    fn block_form() {
        let text = "Expense report Q1\nApproved by:\nJane Doe\nTitle: Program Manager\nDate: 2024-03-15\nThanks";
        let approvals = extract_approvals(text);
        assert_eq!(approvals.len(), 1);
        let a = &approvals[0];
        assert_eq!(a.approver.as_deref(), Some("Jane Doe"));
        assert_eq!(a.title.as_deref(), Some("Program Manager"));
        assert_eq!(a.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(a.target_type.as_deref(), Some("expenseReport"));
        assert!((a.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn hints() {
        let approvals = extract_approvals("OK to pay\nSecond request was denied 01/05/2024");
        assert_eq!(approvals.len(), 2);
        assert_eq!(approvals[0].decision, Decision::Approved);
        assert_eq!(approvals[0].approver, None);
        assert_eq!(approvals[1].decision, Decision::Rejected);
        assert_eq!(approvals[1].date, NaiveDate::from_ymd_opt(2024, 1, 5));
    }

    #[test]
    fn duplicates_suppressed() {
        let text = "Approved by Jane Doe on 2024-03-15\napproved by JANE DOE on 2024-03-15";
        assert_eq!(extract_approvals(text).len(), 1);
    }

    #[test]
    fn rejection_line_not_double_counted_as_hint() {
        let approvals = extract_approvals("Rejected by Tom Lee - Controller");
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].decision, Decision::Rejected);
        assert_eq!(approvals[0].title.as_deref(), Some("Controller"));
    }

    #[test]
    fn confidence_caps() {
        assert!((confidence(true, true, true) - 0.9).abs() < 1e-6);
        assert!(confidence(true, true, true) <= MAX_CONFIDENCE);
    }

    #[test]
    fn no_approvals_in_plain_receipt() {
        assert!(extract_approvals("STAPLES\nTOTAL 12.50").is_empty());
    }
}
