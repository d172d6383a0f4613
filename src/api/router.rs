//! HTTP router.
//!
//! Returns a composable `Router` with every audit endpoint mounted at the
//! root. Uploads are bounded by `DefaultBodyLimit` from configuration; the
//! per-file document limit is enforced by format detection.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router over shared core state.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7). Static
/// segments such as `/docs/link` take priority over `/docs/:id`.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let max_body = core.config.max_body_bytes;
    let ctx = ApiContext::new(core);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/gl/normalize", post(endpoints::gl::normalize))
        .route(
            "/gl",
            get(endpoints::gl::list)
                .post(endpoints::gl::insert)
                .delete(endpoints::gl::clear),
        )
        .route("/gl/:id", delete(endpoints::gl::delete_one))
        .route("/gl/:id/attachments", post(endpoints::gl::attach_document))
        .route(
            "/docs",
            get(endpoints::docs::list).delete(endpoints::docs::clear),
        )
        .route("/docs/ingest", post(endpoints::docs::ingest))
        .route(
            "/docs/link",
            post(endpoints::docs::link).delete(endpoints::docs::unlink),
        )
        .route("/docs/reprocess", post(endpoints::docs::reprocess))
        .route(
            "/docs/:id",
            get(endpoints::docs::detail).delete(endpoints::docs::delete_one),
        )
        .route("/llm-review", post(endpoints::review::review))
        .route("/requirements", get(endpoints::policy::requirements))
        .route(
            "/policy",
            get(endpoints::policy::get).put(endpoints::policy::put),
        )
        .route("/all", delete(endpoints::gl::clear_all))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
