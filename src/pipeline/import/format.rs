use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ImportError;
use crate::config::MAX_DOCUMENT_BYTES;

/// Broad document categories the extractor handles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileCategory {
    Pdf,
    Image,
    Docx,
    PlainText,
    Unsupported,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Docx => "docx",
            Self::PlainText => "plain_text",
            Self::Unsupported => "unsupported",
        }
    }

    /// Candidates for the local OCR step.
    pub fn is_ocr_candidate(&self) -> bool {
        matches!(self, Self::Pdf | Self::Image)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Result of format detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub category: FileCategory,
    pub file_size_bytes: u64,
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Detect a document's format from magic bytes, using the declared MIME
/// type and filename only to tell ZIP containers apart.
pub fn detect_format(
    bytes: &[u8],
    declared_mime: Option<&str>,
    filename: &str,
) -> Result<FormatDetection, ImportError> {
    if bytes.is_empty() {
        return Err(ImportError::EmptyFile);
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ImportError::FileTooLarge {
            size_mb: bytes.len() as f64 / (1024.0 * 1024.0),
            max_mb: (MAX_DOCUMENT_BYTES / (1024 * 1024)) as u64,
        });
    }

    let header = &bytes[..bytes.len().min(16)];
    let (mime_type, category) = match header {
        [0x25, 0x50, 0x44, 0x46, ..] => ("application/pdf".to_string(), FileCategory::Pdf),
        [0xFF, 0xD8, 0xFF, ..] => ("image/jpeg".to_string(), FileCategory::Image),
        [0x89, 0x50, 0x4E, 0x47, ..] => ("image/png".to_string(), FileCategory::Image),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => {
            ("image/tiff".to_string(), FileCategory::Image)
        }
        [b'G', b'I', b'F', b'8', ..] => ("image/gif".to_string(), FileCategory::Image),
        _ if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" => {
            ("image/webp".to_string(), FileCategory::Image)
        }
        _ if header.len() >= 12 && &header[4..8] == b"ftyp" => {
            ("image/heic".to_string(), FileCategory::Image)
        }
        [b'P', b'K', 0x03, 0x04, ..] if is_docx(declared_mime, filename) => {
            (DOCX_MIME.to_string(), FileCategory::Docx)
        }
        _ if is_likely_text(bytes) => ("text/plain".to_string(), FileCategory::PlainText),
        _ => (
            "application/octet-stream".to_string(),
            FileCategory::Unsupported,
        ),
    };

    if !category.is_supported() {
        return Err(ImportError::UnsupportedFormat(
            declared_mime.unwrap_or("unknown").to_string(),
        ));
    }

    Ok(FormatDetection {
        mime_type,
        category,
        file_size_bytes: bytes.len() as u64,
    })
}

fn is_docx(declared_mime: Option<&str>, filename: &str) -> bool {
    declared_mime == Some(DOCX_MIME) || filename.to_lowercase().ends_with(".docx")
}

/// Valid UTF-8 and mostly printable in the first 4 KiB.
fn is_likely_text(bytes: &[u8]) -> bool {
    let chunk = &bytes[..bytes.len().min(4096)];
    let text = match std::str::from_utf8(chunk) {
        Ok(t) => t,
        // Chunk boundary may split a multi-byte char.
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => {
            match std::str::from_utf8(&chunk[..e.valid_up_to()]) {
                Ok(t) => t,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };

    let total = text.chars().count().max(1);
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > 0.80
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let normalized = original.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}
