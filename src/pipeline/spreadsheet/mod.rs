//! GL spreadsheet ingest: CSV/XLSX bytes to canonical GL rows.

pub mod header;
pub mod normalizer;
pub mod parse;

pub use header::*;
pub use normalizer::*;
pub use parse::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook parsing failed: {0}")]
    Workbook(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,

    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    #[error("Spreadsheet is empty")]
    Empty,
}
