use serde::{Deserialize, Serialize};

use super::header::{detect_header_row, map_headers, GlField, HeaderMapping, HEADER_SCAN_ROWS};
use super::parse::{parse_sheet, Grid};
use super::SpreadsheetError;
use crate::models::NewGlEntry;
use crate::pipeline::llm::{parse_json_object, ChatClient, ChatMessage, ChatRequest};
use crate::pipeline::normalize::{parse_amount, parse_date, CellValue};

/// Caller switches for spreadsheet normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeOptions {
    /// Ask the LLM collaborator to locate the header row first.
    #[serde(default)]
    pub use_assist: bool,
    /// Keep debit/credit signs instead of storing absolute amounts.
    #[serde(default)]
    pub signed_amounts: bool,
}

/// Output of [`normalize_sheet`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSheet {
    pub rows: Vec<NewGlEntry>,
    pub mapping: HeaderMapping,
    pub header_row_index: usize,
    pub logs: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

const ASSIST_SYSTEM_PROMPT: &str = "You locate the header row of a general-ledger spreadsheet. \
The user sends the first rows as a JSON array of arrays (0-based). \
Reply with strict JSON only: {\"headerRowIndex\": <integer>}.";

/// Parse spreadsheet bytes and normalize them to canonical GL rows.
///
/// Unreadable input is an `Err`; content problems (no amount column,
/// unparseable cells) are reported through `warnings` / `errors`.
pub fn normalize_sheet(
    bytes: &[u8],
    filename: &str,
    options: NormalizeOptions,
    assist: Option<&dyn ChatClient>,
) -> Result<NormalizedSheet, SpreadsheetError> {
    let _span = tracing::info_span!("normalize_sheet", filename = %filename).entered();
    let grid = parse_sheet(bytes, filename)?;

    let mut out = NormalizedSheet::default();
    out.logs
        .push(format!("Parsed {} raw rows from {}", grid.len(), filename));
    if grid.is_empty() {
        out.errors.push("Spreadsheet contains no rows".into());
        return Ok(out);
    }

    let assisted = if options.use_assist {
        match assist {
            Some(client) => assist_header_row(client, &grid, &mut out),
            None => {
                out.warnings
                    .push("Header assist requested but no LLM is configured".into());
                None
            }
        }
    } else {
        None
    };

    out.header_row_index = match assisted {
        Some(idx) => {
            out.logs.push(format!("Header row {idx} chosen by assist"));
            idx
        }
        None => {
            let idx = detect_header_row(&grid);
            out.logs.push(format!("Header row {idx} chosen by heuristic"));
            idx
        }
    };

    out.mapping = map_headers(&grid[out.header_row_index]);
    out.logs.push(format!("Mapped columns: {}", out.mapping.describe()));
    if out.mapping.is_empty() {
        out.errors
            .push("No recognizable GL columns in the header row".into());
        return Ok(out);
    }
    if !out.mapping.has_amount_source() {
        out.errors
            .push("No amount, debit or credit column found".into());
    }

    let mut dropped = 0usize;
    for (offset, row) in grid[out.header_row_index + 1..].iter().enumerate() {
        let line = out.header_row_index + 2 + offset; // 1-based sheet row
        match normalize_row(row, &out.mapping, options, line, &mut out.warnings) {
            Some(entry) => out.rows.push(entry),
            None => dropped += 1,
        }
    }

    out.logs.push(format!(
        "Normalized {} rows ({} empty rows dropped)",
        out.rows.len(),
        dropped
    ));
    tracing::info!(
        rows = out.rows.len(),
        dropped,
        header_row = out.header_row_index,
        "Spreadsheet normalized"
    );
    Ok(out)
}

fn cell<'a>(row: &'a [CellValue], col: Option<usize>) -> Option<&'a CellValue> {
    col.and_then(|c| row.get(c)).filter(|v| !v.is_empty())
}

fn text_field(row: &[CellValue], mapping: &HeaderMapping, field: GlField) -> Option<String> {
    cell(row, mapping.get(field)).and_then(CellValue::as_text)
}

/// One data row → canonical entry, or `None` when every mapped field is empty.
fn normalize_row(
    row: &[CellValue],
    mapping: &HeaderMapping,
    options: NormalizeOptions,
    line: usize,
    warnings: &mut Vec<String>,
) -> Option<NewGlEntry> {
    let date_cell = cell(row, mapping.date);
    let date = date_cell.and_then(parse_date);
    if let (Some(raw), None) = (date_cell, date) {
        warnings.push(format!(
            "Row {line}: unparseable date '{}'",
            raw.as_text().unwrap_or_default()
        ));
    }

    let amount = row_amount(row, mapping, line, warnings);

    let entry = NewGlEntry {
        account_number: text_field(row, mapping, GlField::AccountNumber),
        description: text_field(row, mapping, GlField::Description),
        amount: 0.0,
        date,
        category: text_field(row, mapping, GlField::Category),
        vendor: text_field(row, mapping, GlField::Vendor),
        contract_number: text_field(row, mapping, GlField::ContractNumber),
    };

    let any_text = entry.account_number.is_some()
        || entry.description.is_some()
        || entry.category.is_some()
        || entry.vendor.is_some()
        || entry.contract_number.is_some();
    if amount.is_none() && date.is_none() && !any_text {
        return None;
    }

    let amount = match amount {
        Some(a) if options.signed_amounts => a,
        Some(a) => a.abs(),
        None => {
            warnings.push(format!("Row {line}: no amount, stored as 0"));
            0.0
        }
    };
    Some(NewGlEntry { amount, ..entry })
}

/// Single amount column, else `debit - credit`.
fn row_amount(
    row: &[CellValue],
    mapping: &HeaderMapping,
    line: usize,
    warnings: &mut Vec<String>,
) -> Option<f64> {
    let parse_col = |col: Option<usize>, warnings: &mut Vec<String>| -> Option<f64> {
        let raw = cell(row, col)?;
        let parsed = parse_amount(raw);
        if parsed.is_none() {
            warnings.push(format!(
                "Row {line}: unparseable amount '{}'",
                raw.as_text().unwrap_or_default()
            ));
        }
        parsed
    };

    if mapping.amount.is_some() {
        return parse_col(mapping.amount, warnings);
    }
    let debit = parse_col(mapping.debit, warnings);
    let credit = parse_col(mapping.credit, warnings);
    match (debit, credit) {
        (None, None) => None,
        (d, c) => Some(d.unwrap_or(0.0) - c.unwrap_or(0.0)),
    }
}

/// Ask the LLM for the header row. Any failure or out-of-range answer
/// falls back to the heuristic.
fn assist_header_row(
    client: &dyn ChatClient,
    grid: &Grid,
    out: &mut NormalizedSheet,
) -> Option<usize> {
    let preview: Vec<Vec<String>> = grid
        .iter()
        .take(HEADER_SCAN_ROWS)
        .map(|row| {
            row.iter()
                .map(|c| c.as_text().unwrap_or_default())
                .collect()
        })
        .collect();
    let user = serde_json::to_string(&preview).ok()?;
    let request = ChatRequest::new(
        vec![ChatMessage::system(ASSIST_SYSTEM_PROMPT), ChatMessage::user(user)],
        50,
    );

    let reply = match client.complete(&request) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Header assist failed");
            out.warnings
                .push(format!("Header assist unavailable: {e}"));
            return None;
        }
    };

    let idx = parse_json_object(&reply)
        .and_then(|v| v.get("headerRowIndex").and_then(serde_json::Value::as_u64))
        .map(|i| i as usize);
    match idx {
        Some(i) if i < preview.len() => Some(i),
        _ => {
            out.warnings
                .push("Header assist reply unusable, using heuristic".into());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::MockChatClient;
    use chrono::NaiveDate;

    const SCENARIO_CSV: &[u8] =
        b",,\nReport\nDate,Vendor,Amount\n2024-03-15,Staples Inc.,\"$1,234.56\"\n";

    #[test]
    fn ingest_with_preamble_rows() {
        let out = normalize_sheet(SCENARIO_CSV, "gl.csv", NormalizeOptions::default(), None).unwrap();
        assert_eq!(out.header_row_index, 2);
        assert_eq!(out.mapping.amount, Some(2));
        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(row.vendor.as_deref(), Some("Staples Inc."));
        assert!((row.amount - 1234.56).abs() < 1e-9);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn debit_minus_credit_and_sign_flag() {
        let csv = b"Date,Payee,Debit,Credit\n2024-01-02,Delta,450.00,\n2024-01-03,Refund,,(20.00)\n2024-01-04,Adj,10,25\n";
        let abs = normalize_sheet(csv, "gl.csv", NormalizeOptions::default(), None).unwrap();
        let amounts: Vec<f64> = abs.rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![450.0, 20.0, 15.0]);

        let signed = normalize_sheet(
            csv,
            "gl.csv",
            NormalizeOptions {
                signed_amounts: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let amounts: Vec<f64> = signed.rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![450.0, 20.0, -15.0]);
    }

    #[test]
    fn drops_empty_rows_and_warns_on_bad_cells() {
        let csv = b"Date,Vendor,Amount\n,,\nnot-a-date,Acme,abc\n2024-02-01,,12\n";
        let out = normalize_sheet(csv, "gl.csv", NormalizeOptions::default(), None).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].vendor.as_deref(), Some("Acme"));
        assert_eq!(out.rows[0].amount, 0.0);
        assert!(out.rows[0].date.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("unparseable date")));
        assert!(out.warnings.iter().any(|w| w.contains("unparseable amount")));
    }

    #[test]
    fn missing_amount_column_is_an_error() {
        let csv = b"Date,Vendor\n2024-02-01,Acme\n";
        let out = normalize_sheet(csv, "gl.csv", NormalizeOptions::default(), None).unwrap();
        assert!(out.errors.iter().any(|e| e.contains("amount")));
        assert_eq!(out.rows.len(), 1);
    }

    #[test]
    fn unrecognized_header_reports_error() {
        let out =
            normalize_sheet(b"foo,bar\n1,2\n", "gl.csv", NormalizeOptions::default(), None).unwrap();
        assert!(out.rows.is_empty());
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn assist_overrides_heuristic_when_in_range() {
        let csv = b"Vendor,Amount\nVendor,Amount\nAcme,5\n";
        let mock = MockChatClient::new(vec![r#"{"headerRowIndex": 1}"#]);
        let out = normalize_sheet(
            csv,
            "gl.csv",
            NormalizeOptions {
                use_assist: true,
                ..Default::default()
            },
            Some(&mock),
        )
        .unwrap();
        assert_eq!(out.header_row_index, 1);
        assert_eq!(out.rows.len(), 1);
        assert!(out.logs.iter().any(|l| l.contains("assist")));
    }

    #[test]
    fn assist_out_of_range_falls_back() {
        let mock = MockChatClient::new(vec![r#"{"headerRowIndex": 40}"#]);
        let out = normalize_sheet(
            SCENARIO_CSV,
            "gl.csv",
            NormalizeOptions {
                use_assist: true,
                ..Default::default()
            },
            Some(&mock),
        )
        .unwrap();
        assert_eq!(out.header_row_index, 2);
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn assist_failure_falls_back() {
        let mock = MockChatClient::new(vec![]);
        let out = normalize_sheet(
            SCENARIO_CSV,
            "gl.csv",
            NormalizeOptions {
                use_assist: true,
                ..Default::default()
            },
            Some(&mock),
        )
        .unwrap();
        assert_eq!(out.header_row_index, 2);
    }

    #[test]
    fn unreadable_input_is_err() {
        assert!(normalize_sheet(b"", "gl.csv", NormalizeOptions::default(), None).is_err());
    }
}
