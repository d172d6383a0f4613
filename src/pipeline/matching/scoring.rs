use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pipeline::normalize::vendor_similarity;

/// Largest |Δ| still counted as an exact amount.
pub const AMOUNT_EXACT_TOLERANCE: f64 = 0.01;

/// Weights of the combined score. Expected to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchWeights {
    pub amount: f64,
    pub date: f64,
    pub vendor: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            amount: 0.45,
            date: 0.35,
            vendor: 0.20,
        }
    }
}

/// Per-field sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub amount: f64,
    pub date: f64,
    pub vendor: f64,
}

pub fn amount_score(item: Option<f64>, gl: f64) -> f64 {
    let Some(item) = item else { return 0.0 };
    let delta = (item - gl).abs();
    if delta <= AMOUNT_EXACT_TOLERANCE {
        1.0
    } else if delta <= 1.0 {
        0.8
    } else if delta <= 5.0 {
        0.6
    } else if delta <= 10.0 {
        0.4
    } else if delta <= 25.0 {
        0.2
    } else {
        0.0
    }
}

/// Item date minus GL date, in days.
pub fn date_delta(item: Option<NaiveDate>, gl: Option<NaiveDate>) -> Option<i64> {
    Some((item? - gl?).num_days())
}

pub fn date_score(delta: Option<i64>) -> f64 {
    match delta.map(i64::abs) {
        Some(0) => 1.0,
        Some(1) => 0.85,
        Some(2..=3) => 0.7,
        Some(4..=7) => 0.5,
        Some(8..=14) => 0.25,
        _ => 0.0,
    }
}

pub fn vendor_score(item: Option<&str>, gl: Option<&str>) -> f64 {
    match (item, gl) {
        (Some(a), Some(b)) => vendor_similarity(a, b),
        _ => 0.0,
    }
}

impl SubScores {
    /// Weighted sum clipped to `[0, 1]`, with the weak-evidence penalty
    /// applied. The exact-match boost is applied by the caller.
    pub fn combined(&self, weights: &MatchWeights) -> f64 {
        let mut score = (self.amount * weights.amount
            + self.date * weights.date
            + self.vendor * weights.vendor)
            .clamp(0.0, 1.0);
        if self.vendor < 0.3 && self.amount < 0.6 && self.date < 0.7 {
            score *= 0.7;
        }
        score
    }

    /// Exact amount, same or adjacent day, and a matching vendor.
    pub fn is_exact(&self) -> bool {
        self.amount >= 1.0 && self.date >= 0.85 && self.vendor >= 0.85
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    #[test]
    fn amount_buckets() {
        assert_eq!(amount_score(Some(100.0), 100.005), 1.0);
        assert_eq!(amount_score(Some(100.0), 100.9), 0.8);
        assert_eq!(amount_score(Some(100.0), 104.0), 0.6);
        assert_eq!(amount_score(Some(100.0), 110.0), 0.4);
        assert_eq!(amount_score(Some(100.0), 75.0), 0.2);
        assert_eq!(amount_score(Some(100.0), 200.0), 0.0);
        assert_eq!(amount_score(None, 100.0), 0.0);
    }

    #[test]
    fn date_buckets() {
        assert_eq!(date_score(Some(0)), 1.0);
        assert_eq!(date_score(Some(-1)), 0.85);
        assert_eq!(date_score(Some(3)), 0.7);
        assert_eq!(date_score(Some(7)), 0.5);
        assert_eq!(date_score(Some(-14)), 0.25);
        assert_eq!(date_score(Some(15)), 0.0);
        assert_eq!(date_score(None), 0.0);
    }

    #[test]
    fn signed_delta() {
        assert_eq!(date_delta(d(2024, 3, 20), d(2024, 3, 10)), Some(10));
        assert_eq!(date_delta(d(2024, 3, 10), d(2024, 3, 20)), Some(-10));
        assert_eq!(date_delta(None, d(2024, 3, 20)), None);
    }

    #[test]
    fn vendor_needs_both_sides() {
        assert_eq!(vendor_score(Some("Staples"), None), 0.0);
        assert_eq!(vendor_score(Some("STAPLES"), Some("Staples Business")), 1.0);
    }

    #[test]
    fn combined_and_penalty() {
        let w = MatchWeights::default();
        let full = SubScores {
            amount: 1.0,
            date: 1.0,
            vendor: 1.0,
        };
        assert!((full.combined(&w) - 1.0).abs() < 1e-9);
        assert!(full.is_exact());

        let weak = SubScores {
            amount: 0.4,
            date: 0.5,
            vendor: 0.1,
        };
        let raw = 0.4 * 0.45 + 0.5 * 0.35 + 0.1 * 0.2;
        assert!((weak.combined(&w) - raw * 0.7).abs() < 1e-9);
        assert!(!weak.is_exact());
    }
}
