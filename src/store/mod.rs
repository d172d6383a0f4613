//! Authoritative in-process entity graph and upload storage.

pub mod graph;
pub mod uploads;

pub use graph::*;
pub use uploads::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate upload: {filename} has the same content as an existing file")]
    DuplicateExact { existing_id: Uuid, filename: String },

    #[error("A file named {filename} already exists; confirm replace to overwrite it")]
    DuplicateName { existing_id: Uuid, filename: String },

    #[error("GL entry not found: {0}")]
    GlEntryNotFound(Uuid),

    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Document item not found: {0}")]
    DocItemNotFound(Uuid),

    #[error("Stored file missing for document {0}")]
    FileMissing(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to do when an upload collides with an existing one by filename.
/// Identical content is always rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Replace,
}
