//! Chat-completions collaborator and tolerant JSON recovery for its output.

pub mod client;
pub mod json;

pub use client::*;
pub use json::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM endpoint unreachable: {0}")]
    Connection(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("LLM returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("LLM returned no content")]
    EmptyResponse,
}
