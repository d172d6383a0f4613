//! Vendor name canonicalization and fuzzy similarity.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Corporate suffixes and generic marketplace words ignored when comparing.
const STOPWORDS: &[&str] = &[
    "and",
    "business",
    "co",
    "com",
    "company",
    "corp",
    "inc",
    "io",
    "llc",
    "ltd",
    "marketplace",
    "net",
    "online",
    "org",
    "store",
    "the",
];

static TLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(com|net|org|io)\b").unwrap());

/// Canonical comparison form: lowercase, no punctuation, no stopwords.
pub fn canonicalize_vendor(name: &str) -> String {
    let without_tld = TLD.replace_all(name, " ");
    let cleaned: String = without_tld
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| STOPWORDS.binary_search(t).is_err())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in `[0, 1]` between two raw vendor names.
///
/// Best of Levenshtein ratio, token-set ratio and partial ratio on the
/// canonical forms. Either side canonicalizing to empty scores 0.
pub fn vendor_similarity(a: &str, b: &str) -> f64 {
    let ca = canonicalize_vendor(a);
    let cb = canonicalize_vendor(b);
    if ca.is_empty() || cb.is_empty() {
        return 0.0;
    }
    if ca == cb {
        return 1.0;
    }
    levenshtein_ratio(&ca, &cb)
        .max(token_set_ratio(&ca, &cb))
        .max(partial_ratio(&ca, &cb))
        .clamp(0.0, 1.0)
}

/// `1 - distance / max_len`.
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / max_len as f64
}

/// Compare the shared token set against each side's leftovers.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let inter: Vec<&str> = ta.intersection(&tb).copied().collect();
    let diff_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let diff_b: Vec<&str> = tb.difference(&ta).copied().collect();

    let t0 = inter.join(" ");
    let t1 = join_nonempty(&t0, &diff_a.join(" "));
    let t2 = join_nonempty(&t0, &diff_b.join(" "));

    if t0.is_empty() {
        return indel_ratio(&t1, &t2);
    }
    indel_ratio(&t0, &t1)
        .max(indel_ratio(&t0, &t2))
        .max(indel_ratio(&t1, &t2))
}

/// Best alignment of the shorter string against windows of the longer.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long): (Vec<char>, Vec<char>) = if a.chars().count() <= b.chars().count() {
        (a.chars().collect(), b.chars().collect())
    } else {
        (b.chars().collect(), a.chars().collect())
    };
    if short.is_empty() {
        return 0.0;
    }

    let short_s: String = short.iter().collect();
    let mut best: f64 = 0.0;
    for start in 0..=(long.len() - short.len()) {
        let window: String = long[start..start + short.len()].iter().collect();
        best = best.max(indel_ratio(&short_s, &window));
        if best >= 1.0 {
            break;
        }
    }
    best
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

/// `2 * LCS / (len_a + len_b)`.
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    2.0 * prev[b.len()] as f64 / total as f64
}

/// Levenshtein edit distance.
pub fn edit_distance(a: &str, b: &str) -> u32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n as u32;
    }
    if n == 0 {
        return m as u32;
    }

    let mut prev: Vec<u32> = (0..=n as u32).collect();
    let mut curr = vec![0u32; n + 1];

    for (i, &a_ch) in a_chars.iter().enumerate() {
        curr[0] = (i + 1) as u32;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_sorted_for_binary_search() {
        for w in STOPWORDS.windows(2) {
            assert!(w[0] < w[1], "{:?} >= {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn canonicalize_strips_suffixes_and_punctuation() {
        assert_eq!(canonicalize_vendor("Staples Inc."), "staples");
        assert_eq!(canonicalize_vendor("STAPLES"), "staples");
        assert_eq!(canonicalize_vendor("Staples Business"), "staples");
        assert_eq!(canonicalize_vendor("Amazon.com Marketplace"), "amazon");
        assert_eq!(canonicalize_vendor("The Home Depot, LLC"), "home depot");
        assert_eq!(canonicalize_vendor("McDonald's"), "mcdonalds");
        assert_eq!(canonicalize_vendor("Johnson & Johnson Co"), "johnson johnson");
    }

    #[test]
    fn identical_after_canonicalization_is_one() {
        assert_eq!(vendor_similarity("STAPLES", "Staples Business"), 1.0);
        assert_eq!(vendor_similarity("Acme Corp", "ACME, Inc."), 1.0);
    }

    #[test]
    fn empty_scores_zero() {
        assert_eq!(vendor_similarity("", "Staples"), 0.0);
        assert_eq!(vendor_similarity("Inc.", "Staples"), 0.0);
    }

    #[test]
    fn token_subset_scores_high() {
        let s = vendor_similarity("Delta", "Delta Air Lines");
        assert!(s >= 0.99, "got {s}");
    }

    #[test]
    fn typo_scores_above_match_threshold() {
        let s = vendor_similarity("Staples", "Stapels");
        assert!(s >= 0.7, "got {s}");
    }

    #[test]
    fn unrelated_vendors_score_low() {
        let s = vendor_similarity("Staples", "Marriott Hotels");
        assert!(s < 0.5, "got {s}");
    }

    #[test]
    fn measures_basic() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert!((levenshtein_ratio("abcd", "abce") - 0.75).abs() < 1e-9);
        assert_eq!(partial_ratio("delta", "delta air lines"), 1.0);
        assert_eq!(token_set_ratio("a b", "b a"), 1.0);
    }
}
