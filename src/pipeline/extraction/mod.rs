//! Supporting-document extraction: text, items, approvals and document type.

pub mod approvals;
pub mod classify;
pub mod intelligence;
pub mod llm_items;
pub mod ocr;
pub mod orchestrator;
pub mod text_fields;
pub mod types;

pub use approvals::*;
pub use classify::*;
pub use intelligence::*;
pub use llm_items::*;
pub use ocr::*;
pub use orchestrator::*;
pub use text_fields::*;
pub use types::*;

use thiserror::Error;

use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Document intelligence request failed: {0}")]
    Intelligence(String),

    #[error("Document intelligence returned error (status {status}): {body}")]
    IntelligenceStatus { status: u16, body: String },

    #[error("Document intelligence analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Document intelligence did not finish after {attempts} polls")]
    PollTimeout { attempts: u32 },

    #[error("LLM extraction failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),

    #[error("Unsupported format for extraction")]
    UnsupportedFormat,
}
