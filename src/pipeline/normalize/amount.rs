//! Locale-aware money parsing.
//!
//! Accepts `$1,234.56`, `1.234,56 €`, `(123.45)`, `USD 99`, `-12` and the
//! like. Values above one billion or non-finite results are rejected.

use super::CellValue;

/// Largest magnitude accepted as a money amount.
pub const MAX_AMOUNT: f64 = 1_000_000_000.0;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '₩', '₽', '¢'];

/// Parse a money cell, keeping its sign.
pub fn parse_amount(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) => accept(*n),
        CellValue::Text(s) => parse_amount_str(s),
        CellValue::Empty | CellValue::Bool(_) | CellValue::Date(_) => None,
    }
}

/// Parse a money cell as an absolute value (GL totals, document items).
pub fn parse_amount_abs(value: &CellValue) -> Option<f64> {
    parse_amount(value).map(f64::abs)
}

/// Parse a money string, keeping its sign.
pub fn parse_amount_str(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }

    // Whitespace (including NBSP / narrow NBSP) and currency symbols.
    let mut cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .filter(|c| !CURRENCY_SYMBOLS.contains(c))
        .collect();

    let mut codes = IsoCodes::default();
    cleaned = codes.strip(&cleaned);

    if let Some(rest) = cleaned.strip_prefix('-') {
        negative = !negative;
        cleaned = rest.to_string();
    } else if let Some(rest) = cleaned.strip_prefix('+') {
        cleaned = rest.to_string();
    } else if let Some(rest) = cleaned.strip_suffix('-') {
        // Trailing-minus accounting form: "123.45-"
        negative = !negative;
        cleaned = rest.to_string();
    }
    // Code behind a sign: "-USD12"
    cleaned = codes.strip(&cleaned);

    if cleaned.is_empty()
        || !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == '.')
        || !cleaned.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }

    let numeric = resolve_separators(&cleaned)?;
    let value: f64 = numeric.parse().ok()?;
    accept(if negative { -value } else { value })
}

fn accept(value: f64) -> Option<f64> {
    if value.is_finite() && value.abs() <= MAX_AMOUNT {
        Some(value)
    } else {
        None
    }
}

/// Drops a leading or trailing three-letter currency code ("USD12",
/// "12EUR"), at most one per end across calls. A letter run of any other
/// length is not a code and is left for the digit check to reject.
#[derive(Default)]
struct IsoCodes {
    prefix_taken: bool,
    suffix_taken: bool,
}

impl IsoCodes {
    fn strip(&mut self, s: &str) -> String {
        let chars: Vec<char> = s.chars().collect();
        let mut start = 0;
        let mut end = chars.len();
        if !self.prefix_taken && leading_letters(chars.iter()) == 3 {
            start = 3;
            self.prefix_taken = true;
        }
        if !self.suffix_taken && leading_letters(chars[start..].iter().rev()) == 3 {
            end -= 3;
            self.suffix_taken = true;
        }
        chars[start..end].iter().collect()
    }
}

fn leading_letters<'a>(chars: impl Iterator<Item = &'a char>) -> usize {
    chars.take_while(|c| c.is_ascii_alphabetic()).count()
}

/// Turn a digits-and-separators string into a plain decimal string.
fn resolve_separators(s: &str) -> Option<String> {
    let has_comma = s.contains(',');
    let has_dot = s.contains('.');

    match (has_comma, has_dot) {
        (true, true) => {
            let last_comma = s.rfind(',')?;
            let last_dot = s.rfind('.')?;
            let (decimal, thousands) = if last_comma > last_dot {
                (',', '.')
            } else {
                ('.', ',')
            };
            let without: String = s.chars().filter(|c| *c != thousands).collect();
            if without.matches(decimal).count() > 1 {
                return None;
            }
            Some(without.replace(decimal, "."))
        }
        (true, false) => {
            let last = s.rfind(',')?;
            let tail = &s[last + 1..];
            if tail.len() == 2 && tail.chars().all(|c| c.is_ascii_digit()) {
                let head: String = s[..last].chars().filter(|c| *c != ',').collect();
                Some(format!("{head}.{tail}"))
            } else {
                Some(s.replace(',', ""))
            }
        }
        (false, true) => {
            if s.matches('.').count() > 1 {
                Some(s.replace('.', ""))
            } else {
                Some(s.to_string())
            }
        }
        (false, false) => Some(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) {
        let a = a.unwrap_or_else(|| panic!("expected {b}, got None"));
        assert!((a - b).abs() < 0.005, "expected {b}, got {a}");
    }

    #[test]
    fn us_format_with_symbol() {
        approx(parse_amount_str("$1,234.56"), 1234.56);
        approx(parse_amount_str("1,234,567.89"), 1_234_567.89);
        approx(parse_amount_str("  $ 42 "), 42.0);
    }

    #[test]
    fn european_format_with_suffix_symbol() {
        approx(parse_amount_str("1.234,56 €"), 1234.56);
        approx(parse_amount_str("1.234.567,00"), 1_234_567.0);
        approx(parse_amount_str("1\u{a0}234,56"), 1234.56);
    }

    #[test]
    fn comma_only_decimal_rule() {
        approx(parse_amount_str("123,45"), 123.45);
        approx(parse_amount_str("1,234"), 1234.0);
        approx(parse_amount_str("12,345,678"), 12_345_678.0);
    }

    #[test]
    fn multiple_dots_are_thousands() {
        approx(parse_amount_str("1.234.567"), 1_234_567.0);
        approx(parse_amount_str("12.50"), 12.5);
    }

    #[test]
    fn parentheses_and_minus_are_negative() {
        approx(parse_amount_str("(123.45)"), -123.45);
        approx(parse_amount_str("(1.234,56)"), -1234.56);
        approx(parse_amount_str("-$12.00"), -12.0);
        approx(parse_amount_str("$-12.00"), -12.0);
        approx(parse_amount_str("99.10-"), -99.1);
    }

    #[test]
    fn iso_codes_are_stripped() {
        approx(parse_amount_str("USD 1,000.00"), 1000.0);
        approx(parse_amount_str("250.75 EUR"), 250.75);
        approx(parse_amount_str("usd12"), 12.0);
        approx(parse_amount_str("-USD12"), -12.0);
        approx(parse_amount_str("EUR 12,50 EUR"), 12.5);
    }

    #[test]
    fn rejects_garbage_and_out_of_range() {
        assert_eq!(parse_amount_str(""), None);
        assert_eq!(parse_amount_str("abc"), None);
        assert_eq!(parse_amount_str("12 apples"), None);
        assert_eq!(parse_amount_str("abcdef12"), None);
        assert_eq!(parse_amount_str("12 app les"), None);
        assert_eq!(parse_amount_str("USD-EUR12"), None);
        assert_eq!(parse_amount_str("$"), None);
        assert_eq!(parse_amount_str("2,000,000,000"), None);
        assert_eq!(parse_amount(&CellValue::Number(f64::NAN)), None);
        assert_eq!(parse_amount(&CellValue::Number(2e9)), None);
    }

    #[test]
    fn cell_variants() {
        approx(parse_amount(&CellValue::Number(-50.0)), -50.0);
        approx(parse_amount_abs(&CellValue::Number(-50.0)), 50.0);
        approx(parse_amount_abs(&CellValue::Text("(1.234,56)".into())), 1234.56);
        assert_eq!(parse_amount(&CellValue::Bool(true)), None);
        assert_eq!(parse_amount(&CellValue::Empty), None);
    }

    #[test]
    fn renders_round_trip_across_magnitudes() {
        for n in [0.0_f64, 0.01, 7.5, 999.99, 1234.56, 98_765.43, 999_999_999.99] {
            let whole = n.trunc() as u64;
            let cents = ((n - whole as f64) * 100.0).round() as u64;
            let us = format!("${}.{:02}", group(whole, ','), cents);
            let eu = format!("{},{:02} €", group(whole, '.'), cents);
            approx(parse_amount_str(&us), n);
            approx(parse_amount_str(&eu), n);
            approx(parse_amount_str(&format!("({us})")), -n);
        }
    }

    fn group(mut n: u64, sep: char) -> String {
        let mut parts = Vec::new();
        loop {
            if n < 1000 {
                parts.push(n.to_string());
                break;
            }
            parts.push(format!("{:03}", n % 1000));
            n /= 1000;
        }
        parts.reverse();
        parts.join(&sep.to_string())
    }
}
