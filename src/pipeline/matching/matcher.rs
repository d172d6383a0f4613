//! Pick at most one GL line per document item.
//!
//! Every GL line is scored on amount / date / vendor. The best line that
//! clears its dynamic threshold wins. When none does, two fallbacks run in
//! order: any exact-amount line, then any line scoring at least
//! `fallback_min_score` with a close date. Ties in both fallbacks go to the
//! smallest date delta, then a vendor match, then the higher score.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scoring::{
    amount_score, date_delta, date_score, vendor_score, MatchWeights, SubScores,
    AMOUNT_EXACT_TOLERANCE,
};
use super::summary::{doc_summary, flags_unallowable};
use crate::models::{DocItem, Discrepancy, GlDocLink, GlEntry};

/// Matcher tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub weights: MatchWeights,
    /// Threshold when either side lacks a vendor.
    pub base_threshold: f64,
    /// Threshold when both sides carry a vendor.
    pub vendor_threshold: f64,
    /// Threshold when vendors disagree but amount is exact and date close.
    pub relaxed_threshold: f64,
    /// Vendor similarity counted as the same vendor.
    pub vendor_match: f64,
    pub fallback_min_score: f64,
    /// Largest |days| counted as a close date.
    pub date_close_days: i64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            weights: MatchWeights::default(),
            base_threshold: 0.60,
            vendor_threshold: 0.80,
            relaxed_threshold: 0.70,
            vendor_match: 0.85,
            fallback_min_score: 0.45,
            date_close_days: 3,
        }
    }
}

/// How the chosen line was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchPath {
    Threshold,
    ExactAmount,
    CloseScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFlags {
    pub exact_boost: bool,
    pub vendor_match: bool,
    pub date_close: bool,
    pub threshold: f64,
    pub path: Option<MatchPath>,
}

/// Result of matching one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub gl_entry_id: Option<Uuid>,
    /// Combined score in `[0, 1]` of the chosen (or best) line.
    pub score: f64,
    pub sub_scores: SubScores,
    pub flags: MatchFlags,
    pub discrepancies: Vec<Discrepancy>,
}

impl MatchOutcome {
    pub fn percent(&self) -> f64 {
        (self.score * 100.0).round()
    }
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    gl: &'a GlEntry,
    order: usize,
    sub: SubScores,
    score: f64,
    exact_boost: bool,
    delta: Option<i64>,
    vendor_match: bool,
    date_close: bool,
    threshold: f64,
}

fn score_candidate<'a>(
    item: &DocItem,
    gl: &'a GlEntry,
    order: usize,
    cfg: &MatchConfig,
) -> Candidate<'a> {
    let delta = date_delta(item.date, gl.date);
    let sub = SubScores {
        amount: amount_score(item.amount, gl.amount),
        date: date_score(delta),
        vendor: vendor_score(item.vendor.as_deref(), gl.vendor.as_deref()),
    };
    let exact_boost = sub.is_exact();
    let score = if exact_boost {
        1.0
    } else {
        sub.combined(&cfg.weights)
    };
    let vendor_match = sub.vendor >= cfg.vendor_match;
    let date_close = delta.is_some_and(|d| d.abs() <= cfg.date_close_days);

    let both_vendors = has_text(item.vendor.as_deref()) && has_text(gl.vendor.as_deref());
    let threshold = if !both_vendors {
        cfg.base_threshold
    } else if !vendor_match && sub.amount >= 1.0 && date_close {
        cfg.relaxed_threshold
    } else {
        cfg.vendor_threshold
    };

    Candidate {
        gl,
        order,
        sub,
        score,
        exact_boost,
        delta,
        vendor_match,
        date_close,
        threshold,
    }
}

fn has_text(s: Option<&str>) -> bool {
    s.is_some_and(|s| !s.trim().is_empty())
}

/// Higher score first, then input order.
fn by_score(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then(a.order.cmp(&b.order))
}

/// Smallest |date delta|, then vendor match, then score, then input order.
fn by_tie_break(a: &Candidate, b: &Candidate) -> Ordering {
    let da = a.delta.map(i64::abs).unwrap_or(i64::MAX);
    let db = b.delta.map(i64::abs).unwrap_or(i64::MAX);
    da.cmp(&db)
        .then(b.vendor_match.cmp(&a.vendor_match))
        .then_with(|| by_score(a, b))
}

fn discrepancies(
    item: &DocItem,
    gl: &GlEntry,
    sub: &SubScores,
    cfg: &MatchConfig,
) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    if let Some(item_amount) = item.amount {
        let absolute = (item_amount - gl.amount).abs();
        if absolute > AMOUNT_EXACT_TOLERANCE {
            let percent = if gl.amount.abs() > f64::EPSILON {
                absolute / gl.amount.abs() * 100.0
            } else {
                100.0
            };
            out.push(Discrepancy::Amount {
                item_amount,
                gl_amount: gl.amount,
                absolute: round2(absolute),
                percent: round2(percent),
            });
        }
    }
    if let (Some(item_date), Some(gl_date)) = (item.date, gl.date) {
        let days = (item_date - gl_date).num_days();
        if days != 0 {
            out.push(Discrepancy::Date {
                item_date,
                gl_date,
                days,
            });
        }
    }
    if let (Some(iv), Some(gv)) = (item.vendor.as_deref(), gl.vendor.as_deref()) {
        if has_text(Some(iv)) && has_text(Some(gv)) && sub.vendor < cfg.vendor_match {
            out.push(Discrepancy::Vendor {
                item_vendor: iv.to_string(),
                gl_vendor: gv.to_string(),
                similarity: round2(sub.vendor),
            });
        }
    }
    out
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Match one item against the candidate GL lines.
pub fn match_item(item: &DocItem, gl_lines: &[GlEntry], cfg: &MatchConfig) -> MatchOutcome {
    let candidates: Vec<Candidate> = gl_lines
        .iter()
        .enumerate()
        .map(|(i, gl)| score_candidate(item, gl, i, cfg))
        .collect();

    let passing = candidates
        .iter()
        .filter(|c| c.score >= c.threshold)
        .min_by(|a, b| by_score(a, b));

    let chosen = passing.map(|c| (c, MatchPath::Threshold)).or_else(|| {
        candidates
            .iter()
            .filter(|c| c.sub.amount >= 1.0)
            .min_by(|a, b| by_tie_break(a, b))
            .map(|c| (c, MatchPath::ExactAmount))
            .or_else(|| {
                candidates
                    .iter()
                    .filter(|c| c.score >= cfg.fallback_min_score && c.date_close)
                    .min_by(|a, b| by_tie_break(a, b))
                    .map(|c| (c, MatchPath::CloseScore))
            })
    });

    match chosen {
        Some((c, path)) => MatchOutcome {
            gl_entry_id: Some(c.gl.id),
            score: c.score,
            sub_scores: c.sub,
            flags: MatchFlags {
                exact_boost: c.exact_boost,
                vendor_match: c.vendor_match,
                date_close: c.date_close,
                threshold: c.threshold,
                path: Some(path),
            },
            discrepancies: discrepancies(item, c.gl, &c.sub, cfg),
        },
        None => {
            let best = candidates.iter().min_by(|a, b| by_score(a, b));
            MatchOutcome {
                gl_entry_id: None,
                score: best.map(|c| c.score).unwrap_or(0.0),
                sub_scores: best.map(|c| c.sub).unwrap_or_default(),
                flags: MatchFlags {
                    exact_boost: false,
                    vendor_match: best.is_some_and(|c| c.vendor_match),
                    date_close: best.is_some_and(|c| c.date_close),
                    threshold: best.map(|c| c.threshold).unwrap_or(cfg.base_threshold),
                    path: None,
                },
                discrepancies: Vec::new(),
            }
        }
    }
}

/// Build the link for a matched item.
pub fn link_for(item: &DocItem, outcome: &MatchOutcome) -> Option<GlDocLink> {
    Some(GlDocLink {
        document_item_id: item.id,
        gl_entry_id: outcome.gl_entry_id?,
        score: outcome.score.clamp(0.0, 1.0),
        doc_summary: doc_summary(item),
        doc_flag_unallowable: flags_unallowable(item),
        discrepancies: outcome.discrepancies.clone(),
    })
}

/// Match every item; at most one link per item.
pub fn match_items(items: &[DocItem], gl_lines: &[GlEntry], cfg: &MatchConfig) -> Vec<GlDocLink> {
    items
        .iter()
        .filter_map(|item| {
            let outcome = match_item(item, gl_lines, cfg);
            tracing::debug!(
                item_id = %item.id,
                matched = outcome.gl_entry_id.is_some(),
                score = outcome.percent(),
                "Item matched"
            );
            link_for(item, &outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemDetails, LineItem, NewGlEntry};
    use chrono::{NaiveDate, Utc};

    fn gl(vendor: Option<&str>, date: &str, amount: f64) -> GlEntry {
        GlEntry::from_new(
            Uuid::new_v4(),
            NewGlEntry {
                vendor: vendor.map(str::to_string),
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
                amount,
                ..Default::default()
            },
            Utc::now(),
        )
    }

    fn item(vendor: Option<&str>, date: &str, amount: f64) -> DocItem {
        DocItem {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            kind: None,
            vendor: vendor.map(str::to_string),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
            amount: Some(amount),
            currency: None,
            details: ItemDetails::default(),
            text_excerpt: None,
        }
    }

    #[test]
    fn exact_match_scores_100() {
        let lines = vec![gl(Some("Staples Business"), "2024-03-15", 1234.56)];
        let outcome = match_item(
            &item(Some("STAPLES"), "2024-03-15", 1234.56),
            &lines,
            &MatchConfig::default(),
        );
        assert_eq!(outcome.gl_entry_id, Some(lines[0].id));
        assert_eq!(outcome.percent(), 100.0);
        assert!(outcome.flags.exact_boost);
        assert!(outcome.discrepancies.is_empty());
    }

    #[test]
    fn date_delta_breaks_exact_amount_tie() {
        let lines = vec![
            gl(Some("Office Depot"), "2024-03-10", 50.0),
            gl(Some("Office Depot"), "2024-03-20", 50.0),
        ];
        let outcome = match_item(
            &item(Some("Acme"), "2024-03-10", 50.0),
            &lines,
            &MatchConfig::default(),
        );
        assert_eq!(outcome.gl_entry_id, Some(lines[0].id));
    }

    #[test]
    fn date_delta_tie_break_without_vendors() {
        let lines = vec![gl(None, "2024-03-20", 50.0), gl(None, "2024-03-10", 50.0)];
        let outcome = match_item(
            &item(Some("Acme"), "2024-03-10", 50.0),
            &lines,
            &MatchConfig::default(),
        );
        assert_eq!(outcome.gl_entry_id, Some(lines[1].id));
    }

    #[test]
    fn exact_amount_fallback_when_vendors_disagree() {
        let lines = vec![
            gl(Some("Delta Air Lines"), "2024-05-01", 310.0),
            gl(Some("Marriott"), "2024-03-12", 75.0),
        ];
        let outcome = match_item(
            &item(Some("Acme Widgets"), "2024-03-30", 310.0),
            &lines,
            &MatchConfig::default(),
        );
        assert_eq!(outcome.gl_entry_id, Some(lines[0].id));
        assert_eq!(outcome.flags.path, Some(MatchPath::ExactAmount));
        assert!(outcome
            .discrepancies
            .iter()
            .any(|d| matches!(d, Discrepancy::Date { days: -32, .. })));
        assert!(outcome
            .discrepancies
            .iter()
            .any(|d| matches!(d, Discrepancy::Vendor { .. })));
    }

    #[test]
    fn vendor_variants_never_unmatched() {
        let lines = vec![
            gl(Some("Staples"), "2024-03-15", 99.0),
            gl(Some("Staples Business"), "2024-03-15", 99.0),
        ];
        let outcome = match_item(
            &item(Some("Staples Inc"), "2024-03-15", 99.0),
            &lines,
            &MatchConfig::default(),
        );
        assert!(outcome.gl_entry_id.is_some());
    }

    #[test]
    fn relaxed_threshold_when_vendor_differs() {
        let lines = vec![gl(Some("Amazon"), "2024-03-15", 42.0)];
        let outcome = match_item(
            &item(Some("AMZN Mktp US"), "2024-03-16", 42.0),
            &lines,
            &MatchConfig::default(),
        );
        assert_eq!(outcome.flags.threshold, 0.70);
        assert!(outcome.gl_entry_id.is_some());
    }

    #[test]
    fn close_score_fallback() {
        // Amount off by $3, date off one day, no vendors: 0.6*.45 + .85*.35 = 0.5675
        let lines = vec![gl(None, "2024-03-15", 103.0)];
        let cfg = MatchConfig {
            base_threshold: 0.9,
            ..Default::default()
        };
        let outcome = match_item(&item(None, "2024-03-16", 100.0), &lines, &cfg);
        assert_eq!(outcome.flags.path, Some(MatchPath::CloseScore));
        assert!(matches!(
            outcome.discrepancies[0],
            Discrepancy::Amount { absolute, .. } if (absolute - 3.0).abs() < 1e-9
        ));
    }

    #[test]
    fn nothing_plausible_is_no_match() {
        let lines = vec![gl(Some("Hilton"), "2023-01-01", 900.0)];
        let outcome = match_item(
            &item(Some("Staples"), "2024-03-15", 12.0),
            &lines,
            &MatchConfig::default(),
        );
        assert_eq!(outcome.gl_entry_id, None);
        assert!(link_for(&item(None, "2024-01-01", 1.0), &outcome).is_none());
        assert_eq!(
            match_item(&item(None, "2024-01-01", 1.0), &[], &MatchConfig::default()).gl_entry_id,
            None
        );
    }

    #[test]
    fn link_carries_summary_and_flag() {
        let lines = vec![gl(Some("Hilton"), "2024-02-01", 400.0)];
        let mut it = item(Some("Hilton Hotels"), "2024-02-01", 400.0);
        it.details.lines = vec![LineItem {
            desc: Some("Wine".into()),
            total: Some(50.0),
            ..Default::default()
        }];
        let links = match_items(&[it.clone()], &lines, &MatchConfig::default());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].document_item_id, it.id);
        assert_eq!(links[0].gl_entry_id, lines[0].id);
        assert!(links[0].doc_flag_unallowable);
        assert_eq!(
            links[0].doc_summary.as_deref(),
            Some("Hilton Hotels | 2024-02-01 | $400.00 | Wine")
        );
    }
}
