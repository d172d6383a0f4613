//! Supporting-document endpoints: ingest, listing, links, reprocess.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::gl::{clear_scope, ClearResponse};
use crate::api::error::{ApiError, ErrorDetail};
use crate::api::types::{parse_flag, read_multipart, run_blocking, ApiContext};
use crate::config::MAX_FILES_PER_INGEST;
use crate::models::enums::ClearScope;
use crate::models::{DocItem, Document, GlDocLink};
use crate::pipeline::import::sanitize_filename;
use crate::pipeline::processor::{IngestOutcome, Upload};
use crate::store::DuplicatePolicy;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    pub success: bool,
    pub filename: String,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum IngestFileResult {
    Processed(Box<IngestOutcome>),
    Failed(IngestFailure),
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub results: Vec<IngestFileResult>,
}

/// `POST /docs/ingest`: multipart with up to ten files and an optional
/// `replace` flag that lets a same-named upload supersede the old one.
///
/// Files are processed in order and fail independently. A single-file
/// request that fails returns the failure as the response error.
pub async fn ingest(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut uploads = Vec::new();
    let mut policy = DuplicatePolicy::Reject;
    for part in read_multipart(multipart).await? {
        if part.name == "replace" {
            if parse_flag(&part.text()) {
                policy = DuplicatePolicy::Replace;
            }
            continue;
        }
        let Some(file_name) = part.file_name.clone() else {
            continue;
        };
        uploads.push(Upload {
            filename: file_name,
            declared_mime: part.declared_mime(),
            bytes: part.bytes,
        });
    }

    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".into()));
    }
    if uploads.len() > MAX_FILES_PER_INGEST {
        return Err(ApiError::BadRequest(format!(
            "Too many files: {} (max {MAX_FILES_PER_INGEST})",
            uploads.len()
        )));
    }

    let single = uploads.len() == 1;
    let core = ctx.core.clone();
    let results = run_blocking(move || {
        let mut results = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let filename = sanitize_filename(&upload.filename);
            match core.processor().ingest(core.store_lock(), upload, policy) {
                Ok(outcome) => results.push(IngestFileResult::Processed(Box::new(outcome))),
                Err(e) => {
                    let err = ApiError::from(e);
                    if single {
                        return Err(err);
                    }
                    tracing::warn!(filename = %filename, error = %err, "Document ingest failed");
                    results.push(IngestFileResult::Failed(IngestFailure {
                        success: false,
                        filename,
                        error: err.detail(),
                    }));
                }
            }
        }
        Ok(results)
    })
    .await?;

    Ok(Json(IngestResponse { results }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    #[serde(flatten)]
    pub document: Document,
    pub items_count: usize,
    pub links_count: usize,
    pub approvals_count: usize,
}

/// `GET /docs`
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let store = ctx.core.read_store()?;
    let summaries = store
        .documents()
        .iter()
        .map(|doc| DocumentSummary {
            items_count: store.items_for_document(&doc.id).len(),
            links_count: store.links_for_document(&doc.id).len(),
            approvals_count: doc.approvals.len(),
            document: doc.clone(),
        })
        .collect();
    Ok(Json(summaries))
}

#[derive(Serialize)]
pub struct DocumentDetail {
    pub document: Document,
    pub items: Vec<DocItem>,
    pub links: Vec<GlDocLink>,
}

/// `GET /docs/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentDetail>, ApiError> {
    let store = ctx.core.read_store()?;
    let document = store
        .document(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Document {id}")))?;
    Ok(Json(DocumentDetail {
        items: store.items_for_document(&id).into_iter().cloned().collect(),
        links: store.links_for_document(&id).into_iter().cloned().collect(),
        document,
    }))
}

/// `DELETE /docs/:id`: removes the document with its items, links and file.
pub async fn delete_one(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    let core = ctx.core.clone();
    let removed = run_blocking(move || {
        let removed = core.write_store()?.remove_document(&id)?;
        Ok(removed)
    })
    .await?;
    Ok(Json(removed))
}

/// `DELETE /docs`
pub async fn clear(State(ctx): State<ApiContext>) -> Result<Json<ClearResponse>, ApiError> {
    clear_scope(ctx, ClearScope::Docs).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub document_item_id: Uuid,
    pub gl_entry_id: Uuid,
}

/// `POST /docs/link`
pub async fn link(
    State(ctx): State<ApiContext>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<GlDocLink>, ApiError> {
    let core = ctx.core.clone();
    let link = run_blocking(move || {
        let link = core
            .write_store()?
            .link(&request.document_item_id, &request.gl_entry_id)?;
        Ok(link)
    })
    .await?;
    tracing::info!(
        document_item_id = %link.document_item_id,
        gl_entry_id = %link.gl_entry_id,
        "Manual link created"
    );
    Ok(Json(link))
}

#[derive(Serialize)]
pub struct UnlinkResponse {
    pub removed: bool,
}

/// `DELETE /docs/link`
pub async fn unlink(
    State(ctx): State<ApiContext>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<UnlinkResponse>, ApiError> {
    let core = ctx.core.clone();
    let removed = run_blocking(move || {
        let removed = core
            .write_store()?
            .unlink(&request.document_item_id, &request.gl_entry_id);
        Ok(removed)
    })
    .await?;
    if !removed {
        return Err(ApiError::NotFound("Link does not exist".into()));
    }
    Ok(Json(UnlinkResponse { removed }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    pub document_id: Uuid,
}

/// `POST /docs/reprocess`
pub async fn reprocess(
    State(ctx): State<ApiContext>,
    Json(request): Json<ReprocessRequest>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let core = ctx.core.clone();
    let outcome = run_blocking(move || {
        let outcome = core
            .processor()
            .reprocess(core.store_lock(), &request.document_id)?;
        Ok(outcome)
    })
    .await?;
    Ok(Json(outcome))
}
