//! FAR Part 31 compliance review endpoint.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{run_blocking, ApiContext};
use crate::pipeline::review::{review_rows, ReviewOutput, ReviewRow};

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rows: Vec<ReviewRow>,
}

/// `POST /llm-review`
///
/// Attachments are snapshotted under a read lock; the LLM calls run with no
/// lock held.
pub async fn review(
    State(ctx): State<ApiContext>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ReviewOutput>, ApiError> {
    if request.rows.is_empty() {
        return Err(ApiError::BadRequest("No rows to review".into()));
    }

    let core = ctx.core.clone();
    let output = run_blocking(move || {
        let client = core.llm()?;
        let index = core
            .read_store()?
            .attachment_index(request.rows.iter().filter_map(|r| r.id));
        let output = review_rows(client, &request.rows, &index)?;
        Ok(output)
    })
    .await?;

    tracing::info!(
        rows = output.results.len(),
        partial = output.warning.is_some(),
        "Compliance review finished"
    );
    Ok(Json(output))
}
