use std::io::Cursor;

use calamine::{Data, Reader};
use chrono::{Duration, NaiveDate};

use super::SpreadsheetError;
use crate::pipeline::normalize::CellValue;

/// A sheet as row-major cells, 0-based on both axes.
pub type Grid = Vec<Vec<CellValue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Workbook,
}

/// Pick a parser by filename suffix, falling back to a ZIP/OLE magic sniff.
pub fn detect_sheet_format(filename: &str, bytes: &[u8]) -> Result<SheetFormat, SpreadsheetError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" | "txt" | "tsv" => Ok(SheetFormat::Csv),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SheetFormat::Workbook),
        _ if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) => {
            Ok(SheetFormat::Workbook)
        }
        _ if std::str::from_utf8(&bytes[..bytes.len().min(4096)]).is_ok() => Ok(SheetFormat::Csv),
        _ => Err(SpreadsheetError::UnsupportedFormat(filename.to_string())),
    }
}

/// Parse spreadsheet bytes into a grid.
pub fn parse_sheet(bytes: &[u8], filename: &str) -> Result<Grid, SpreadsheetError> {
    if bytes.is_empty() {
        return Err(SpreadsheetError::Empty);
    }
    match detect_sheet_format(filename, bytes)? {
        SheetFormat::Csv => parse_csv(bytes),
        SheetFormat::Workbook => parse_workbook(bytes),
    }
}

/// Lax CSV: ragged rows allowed, blank lines skipped, `;`/tab delimiters sniffed.
pub fn parse_csv(bytes: &[u8]) -> Result<Grid, SpreadsheetError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let delimiter = sniff_delimiter(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| CellValue::from(String::from_utf8_lossy(field).as_ref()))
            .collect();
        if row.iter().all(CellValue::is_empty) && row.len() <= 1 {
            continue;
        }
        grid.push(row);
    }
    Ok(grid)
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes
        .split(|b| *b == b'\n')
        .find(|line| line.iter().any(|b| !b.is_ascii_whitespace()))
        .unwrap_or(&[]);
    let count = |d: u8| first_line.iter().filter(|b| **b == d).count();
    let (commas, semis, tabs) = (count(b','), count(b';'), count(b'\t'));
    if tabs > commas && tabs > semis {
        b'\t'
    } else if semis > commas {
        b';'
    } else {
        b','
    }
}

/// First worksheet of an XLSX/XLS/ODS workbook, padded so cell `(r, c)` of
/// the sheet lands at `grid[r][c]`.
pub fn parse_workbook(bytes: &[u8]) -> Result<Grid, SpreadsheetError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::NoWorksheet)?
        .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;

    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut grid: Grid = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(cell_from_data));
        grid.push(cells);
    }
    Ok(grid)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => excel_day(dt.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
    }
}

/// Whole days since the Excel epoch, without the range filter used for
/// bare numbers (the cell is already typed as a date).
fn excel_day(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}
