//! Shared types for the HTTP layer.

use std::sync::Arc;

use axum::extract::Multipart;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::core_state::CoreState;

/// Default and maximum page sizes for list endpoints.
pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Shared context for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// `?limit=&offset=`
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Pagination {
    pub fn resolve(&self) -> (usize, usize) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (limit, self.offset.unwrap_or(0))
    }
}

/// Run store access or a blocking collaborator call off the async workers.
pub async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task failed: {e}")))?
}

/// One multipart field, read fully into memory.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FormPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Declared MIME type, falling back to a guess from the filename when the
    /// client sent none or a generic octet-stream.
    pub fn declared_mime(&self) -> Option<String> {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => Some(ct.to_string()),
            _ => self
                .file_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string),
        }
    }
}

/// Drain a multipart body. Malformed bodies are a client error.
pub async fn read_multipart(mut multipart: Multipart) -> Result<Vec<FormPart>, ApiError> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field '{name}': {e}")))?;
        parts.push(FormPart {
            name,
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Ok(parts)
}

/// Form-field booleans: `true`, `1`, `yes`, `on`.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::default().resolve(), (DEFAULT_PAGE_LIMIT, 0));
        let p = Pagination {
            limit: Some(50_000),
            offset: Some(20),
        };
        assert_eq!(p.resolve(), (MAX_PAGE_LIMIT, 20));
        let p = Pagination {
            limit: Some(0),
            offset: None,
        };
        assert_eq!(p.resolve(), (1, 0));
    }

    #[test]
    fn flags() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    fn part(file_name: Option<&str>, content_type: Option<&str>) -> FormPart {
        FormPart {
            name: "files".into(),
            file_name: file_name.map(str::to_string),
            content_type: content_type.map(str::to_string),
            bytes: Vec::new(),
        }
    }

    #[test]
    fn declared_mime_prefers_client_type() {
        let p = part(Some("scan.pdf"), Some("image/png"));
        assert_eq!(p.declared_mime().as_deref(), Some("image/png"));
    }

    #[test]
    fn declared_mime_guesses_from_filename() {
        let p = part(Some("scan.pdf"), Some("application/octet-stream"));
        assert_eq!(p.declared_mime().as_deref(), Some("application/pdf"));
        let p = part(Some("photo.JPG"), None);
        assert_eq!(p.declared_mime().as_deref(), Some("image/jpeg"));
        assert_eq!(part(None, None).declared_mime(), None);
    }

    #[tokio::test]
    async fn run_blocking_propagates_errors() {
        let ok = run_blocking(|| Ok::<_, ApiError>(2 + 2)).await.unwrap();
        assert_eq!(ok, 4);
        let err = run_blocking(|| Err::<(), _>(ApiError::BadRequest("no".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
