//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gl_entries: usize,
    pub documents: usize,
    pub llm_configured: bool,
    pub di_configured: bool,
}

/// `GET /health`
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let (gl_entries, documents) = {
        let store = ctx.core.read_store()?;
        (store.gl_entries().len(), store.documents().len())
    };

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        gl_entries,
        documents,
        llm_configured: ctx.core.llm_configured(),
        di_configured: ctx.core.di_configured(),
    }))
}
