//! Documentation policy and per-line requirements.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{run_blocking, ApiContext};
use crate::models::{Policy, Thresholds};
use crate::policy::{requirements as evaluate_requirements, Requirement};

/// `GET /policy`
pub async fn get(State(ctx): State<ApiContext>) -> Result<Json<Policy>, ApiError> {
    let policy = ctx.core.read_store()?.policy().clone();
    Ok(Json(policy))
}

/// `PUT /policy`
pub async fn put(
    State(ctx): State<ApiContext>,
    Json(policy): Json<Policy>,
) -> Result<Json<Policy>, ApiError> {
    validate(&policy)?;
    let core = ctx.core.clone();
    let saved = policy.clone();
    run_blocking(move || {
        core.write_store()?.set_policy(policy);
        Ok(())
    })
    .await?;
    tracing::info!("Documentation policy updated");
    Ok(Json(saved))
}

fn validate(policy: &Policy) -> Result<(), ApiError> {
    let check = |name: &str, value: f64| {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(ApiError::BadRequest(format!(
                "{name} must be a non-negative amount"
            )))
        }
    };
    let thresholds = |prefix: &str, t: &Thresholds| {
        check(&format!("{prefix}.receiptThreshold"), t.receipt_threshold)?;
        check(&format!("{prefix}.approvalThreshold"), t.approval_threshold)
    };

    check("lowDollarWaiver.threshold", policy.low_dollar_waiver.threshold)?;
    thresholds("general", &policy.general)?;
    thresholds("categories.travel", &policy.categories.travel)?;
    thresholds("categories.meals", &policy.categories.meals)?;
    thresholds("categories.supplies", &policy.categories.supplies)
}

#[derive(Serialize)]
pub struct RequirementsResponse {
    pub policy: Policy,
    pub requirements: Vec<Requirement>,
}

/// `GET /requirements`
pub async fn requirements(
    State(ctx): State<ApiContext>,
) -> Result<Json<RequirementsResponse>, ApiError> {
    let store = ctx.core.read_store()?;
    let policy = store.policy().clone();
    Ok(Json(RequirementsResponse {
        requirements: evaluate_requirements(store.gl_entries(), &policy),
        policy,
    }))
}
