//! Header-row detection and header → canonical field mapping.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::parse::Grid;
use crate::pipeline::normalize::{parse_amount_str, CellValue};

/// Rows scanned when looking for the header.
pub const HEADER_SCAN_ROWS: usize = 20;

/// Canonical GL field a header can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlField {
    Date,
    AccountNumber,
    Description,
    Amount,
    Category,
    Vendor,
    ContractNumber,
}

impl GlField {
    /// Mapping order; earlier fields claim a column first.
    pub const ALL: [GlField; 7] = [
        GlField::Date,
        GlField::AccountNumber,
        GlField::Description,
        GlField::Amount,
        GlField::Category,
        GlField::Vendor,
        GlField::ContractNumber,
    ];

    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            GlField::Date => &[
                "date",
                "postingdate",
                "postdate",
                "txndate",
                "transactiondate",
                "invoicedate",
                "documentdate",
            ],
            GlField::AccountNumber => &[
                "account",
                "accountnumber",
                "accountno",
                "acct",
                "acctno",
                "glaccount",
                "glaccountnumber",
            ],
            GlField::Description => &["description", "memo", "details", "narration", "desc"],
            GlField::Amount => &[
                "amount",
                "total",
                "totalamount",
                "netamount",
                "grossamount",
                "amt",
                "debit",
                "credit",
            ],
            GlField::Category => &["category", "accounttype", "expensetype", "costcategory"],
            GlField::Vendor => &[
                "vendor",
                "vendorname",
                "supplier",
                "suppliername",
                "payee",
                "merchant",
            ],
            GlField::ContractNumber => &[
                "contractnumber",
                "contract",
                "contractid",
                "contractno",
                "jobnumber",
                "projectnumber",
                "awardnumber",
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GlField::Date => "date",
            GlField::AccountNumber => "accountNumber",
            GlField::Description => "description",
            GlField::Amount => "amount",
            GlField::Category => "category",
            GlField::Vendor => "vendor",
            GlField::ContractNumber => "contractNumber",
        }
    }
}

/// Column index per canonical field, plus debit/credit columns used when
/// no single amount column exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMapping {
    pub date: Option<usize>,
    pub account_number: Option<usize>,
    pub description: Option<usize>,
    pub amount: Option<usize>,
    pub category: Option<usize>,
    pub vendor: Option<usize>,
    pub contract_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<usize>,
}

impl HeaderMapping {
    pub fn get(&self, field: GlField) -> Option<usize> {
        match field {
            GlField::Date => self.date,
            GlField::AccountNumber => self.account_number,
            GlField::Description => self.description,
            GlField::Amount => self.amount,
            GlField::Category => self.category,
            GlField::Vendor => self.vendor,
            GlField::ContractNumber => self.contract_number,
        }
    }

    fn set(&mut self, field: GlField, col: usize) {
        let slot = match field {
            GlField::Date => &mut self.date,
            GlField::AccountNumber => &mut self.account_number,
            GlField::Description => &mut self.description,
            GlField::Amount => &mut self.amount,
            GlField::Category => &mut self.category,
            GlField::Vendor => &mut self.vendor,
            GlField::ContractNumber => &mut self.contract_number,
        };
        *slot = Some(col);
    }

    /// True when some column can produce an amount.
    pub fn has_amount_source(&self) -> bool {
        self.amount.is_some() || self.debit.is_some() || self.credit.is_some()
    }

    pub fn is_empty(&self) -> bool {
        GlField::ALL.iter().all(|f| self.get(*f).is_none()) && !self.has_amount_source()
    }

    /// `field=col` pairs for logging.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = GlField::ALL
            .iter()
            .filter_map(|f| self.get(*f).map(|c| format!("{}={}", f.as_str(), c)))
            .collect();
        if let Some(c) = self.debit {
            parts.push(format!("debit={c}"));
        }
        if let Some(c) = self.credit {
            parts.push(format!("credit={c}"));
        }
        parts.join(", ")
    }
}

static HEADER_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)amount|date|vendor|account|description|category|contract").unwrap()
});

/// Lowercase alphanumerics only: "Posting Date" → "postingdate".
pub fn canonicalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_known_synonym(canonical: &str) -> bool {
    !canonical.is_empty()
        && GlField::ALL
            .iter()
            .any(|f| f.synonyms().contains(&canonical))
}

fn is_numeric_only(cell: &CellValue) -> bool {
    match cell {
        CellValue::Number(_) => true,
        CellValue::Text(s) => parse_amount_str(s).is_some(),
        _ => false,
    }
}

/// Heuristic header score of one row.
pub fn score_header_row(row: &[CellValue]) -> i32 {
    let mut score = 0;
    let mut non_empty = 0;
    let mut numeric = 0;

    for cell in row {
        if cell.is_empty() {
            continue;
        }
        non_empty += 1;
        if is_numeric_only(cell) {
            numeric += 1;
        }
        let Some(text) = cell.as_text() else { continue };
        if is_known_synonym(&canonicalize_header(&text)) {
            score += 3;
        }
        if text.chars().any(char::is_alphabetic) {
            score += 1;
        }
        if HEADER_KEYWORD.is_match(&text) {
            score += 2;
        }
    }

    if non_empty > 0 && numeric * 2 > non_empty {
        score -= 3;
    }
    score
}

/// Highest-scoring row among the first [`HEADER_SCAN_ROWS`]; ties go to the
/// lowest index. An empty grid yields 0.
pub fn detect_header_row(grid: &Grid) -> usize {
    let mut best = (0usize, i32::MIN);
    for (i, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let score = score_header_row(row);
        if score > best.1 {
            best = (i, score);
        }
    }
    best.0
}

/// Map header cells onto canonical fields. Each column is claimed at most once.
pub fn map_headers(header: &[CellValue]) -> HeaderMapping {
    let canon: Vec<String> = header
        .iter()
        .map(|c| c.as_text().map(|t| canonicalize_header(&t)).unwrap_or_default())
        .collect();

    let mut mapping = HeaderMapping::default();
    let mut used: HashSet<usize> = HashSet::new();

    for field in GlField::ALL {
        let synonyms: Vec<&str> = field
            .synonyms()
            .iter()
            .copied()
            .filter(|s| field != GlField::Amount || (*s != "debit" && *s != "credit"))
            .collect();
        if let Some(col) = canon
            .iter()
            .enumerate()
            .find(|(i, h)| !used.contains(i) && synonyms.contains(&h.as_str()))
            .map(|(i, _)| i)
        {
            mapping.set(field, col);
            used.insert(col);
        }
    }

    if mapping.amount.is_none() {
        let find = |name: &str| {
            canon
                .iter()
                .enumerate()
                .find(|(i, h)| !used.contains(i) && h.as_str() == name)
                .map(|(i, _)| i)
        };
        mapping.debit = find("debit");
        mapping.credit = find("credit");
        if mapping.debit.is_some() && mapping.credit.is_none() {
            // A lone debit column is the amount column.
            mapping.amount = mapping.debit.take();
        } else if mapping.credit.is_some() && mapping.debit.is_none() {
            mapping.amount = mapping.credit.take();
        }
    }

    mapping
}
