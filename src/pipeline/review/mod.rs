//! Batched LLM compliance review of GL rows.

pub mod orchestrator;
pub mod parser;
pub mod prompt;

pub use orchestrator::*;
pub use parser::*;
pub use prompt::*;

use thiserror::Error;

use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("No reviewed row has a linked image or PDF supporting document")]
    NoSupportingDocuments,

    #[error("LLM unavailable: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
