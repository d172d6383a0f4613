//! General-ledger endpoints: spreadsheet normalization, rows, clears.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_flag, read_multipart, run_blocking, ApiContext, Pagination};
use crate::models::enums::ClearScope;
use crate::models::{GlEntry, NewGlEntry, UploadRecord};
use crate::pipeline::import::{content_hash, sanitize_filename};
use crate::pipeline::spreadsheet::{normalize_sheet, NormalizeOptions, NormalizedSheet};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeResponse {
    #[serde(flatten)]
    pub sheet: NormalizedSheet,
    pub file_metadata: UploadRecord,
}

/// `POST /gl/normalize`: multipart with one spreadsheet file plus optional
/// `allowDuplicate`, `useAssist` and `signedAmounts` flags.
///
/// Rows are returned for review, not stored; the upload itself is recorded
/// for duplicate detection.
pub async fn normalize(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<NormalizeResponse>, ApiError> {
    let mut file = None;
    let mut allow_duplicate = false;
    let mut options = NormalizeOptions::default();
    for part in read_multipart(multipart).await? {
        match part.name.as_str() {
            "allowDuplicate" => allow_duplicate = parse_flag(&part.text()),
            "useAssist" => options.use_assist = parse_flag(&part.text()),
            "signedAmounts" => options.signed_amounts = parse_flag(&part.text()),
            _ if part.file_name.is_some() && file.is_none() => file = Some(part),
            _ => {}
        }
    }
    let file = file.ok_or_else(|| ApiError::BadRequest("Missing spreadsheet file".into()))?;
    if file.bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded spreadsheet is empty".into()));
    }
    let filename = sanitize_filename(file.file_name.as_deref().unwrap_or_default());

    let core = ctx.core.clone();
    let response = run_blocking(move || {
        let hash = content_hash(&file.bytes);
        core.read_store()?
            .check_gl_upload(&filename, &hash, allow_duplicate)?;

        let sheet = normalize_sheet(&file.bytes, &filename, options, core.llm().ok())?;
        let file_metadata =
            core.write_store()?
                .record_gl_upload(&filename, &file.bytes, sheet.rows.len());
        Ok(NormalizeResponse {
            sheet,
            file_metadata,
        })
    })
    .await?;

    tracing::info!(
        filename = %response.file_metadata.filename,
        rows = response.sheet.rows.len(),
        errors = response.sheet.errors.len(),
        "GL spreadsheet normalized"
    );
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct InsertRequest {
    pub entries: Vec<NewGlEntry>,
}

#[derive(Serialize)]
pub struct InsertResponse {
    pub inserted: usize,
    pub ids: Vec<Uuid>,
}

/// `POST /gl`
pub async fn insert(
    State(ctx): State<ApiContext>,
    Json(request): Json<InsertRequest>,
) -> Result<Json<InsertResponse>, ApiError> {
    let core = ctx.core.clone();
    let ids = run_blocking(move || {
        let ids = core.write_store()?.add_gl_entries(request.entries);
        Ok(ids)
    })
    .await?;
    Ok(Json(InsertResponse {
        inserted: ids.len(),
        ids,
    }))
}

#[derive(Serialize)]
pub struct GlPage {
    pub rows: Vec<GlEntry>,
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

/// `GET /gl?limit=&offset=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(page): Query<Pagination>,
) -> Result<Json<GlPage>, ApiError> {
    let (limit, offset) = page.resolve();
    let store = ctx.core.read_store()?;
    Ok(Json(GlPage {
        rows: store.gl_page(limit, offset),
        limit,
        offset,
        total: store.gl_entries().len(),
    }))
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub cleared: ClearScope,
}

/// `DELETE /gl`
pub async fn clear(State(ctx): State<ApiContext>) -> Result<Json<ClearResponse>, ApiError> {
    clear_scope(ctx, ClearScope::Gl).await
}

/// `DELETE /all`
pub async fn clear_all(State(ctx): State<ApiContext>) -> Result<Json<ClearResponse>, ApiError> {
    clear_scope(ctx, ClearScope::All).await
}

pub(crate) async fn clear_scope(
    ctx: ApiContext,
    scope: ClearScope,
) -> Result<Json<ClearResponse>, ApiError> {
    let core = ctx.core.clone();
    run_blocking(move || {
        core.write_store()?.clear(scope);
        Ok(())
    })
    .await?;
    tracing::info!(scope = scope.as_str(), "Store partition cleared");
    Ok(Json(ClearResponse { cleared: scope }))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: Uuid,
}

/// `DELETE /gl/:id`
pub async fn delete_one(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let core = ctx.core.clone();
    run_blocking(move || {
        core.write_store()?.delete_gl_entry(&id)?;
        Ok(())
    })
    .await?;
    Ok(Json(DeletedResponse { deleted: id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub document_id: Uuid,
}

/// `POST /gl/:id/attachments`
pub async fn attach_document(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachRequest>,
) -> Result<Json<GlEntry>, ApiError> {
    let core = ctx.core.clone();
    let entry = run_blocking(move || {
        let entry = core
            .write_store()?
            .attach_document_to_gl(&id, &request.document_id)?;
        Ok(entry)
    })
    .await?;
    Ok(Json(entry))
}
