//! API server lifecycle: bind, serve, drain on shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::api::router::api_router;
use crate::core_state::CoreState;

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(core: Arc<CoreState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(core.config.bind).await?;
    serve_on(listener, core, ctrl_c()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// In-flight requests finish before this returns.
pub async fn serve_on(
    listener: TcpListener,
    core: Arc<CoreState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "FarCheck API listening");

    let shutdown = async move {
        shutdown.await;
        tracing::info!("FarCheck API received shutdown signal");
    };
    axum::serve(listener, api_router(core))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("FarCheck API stopped");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}
