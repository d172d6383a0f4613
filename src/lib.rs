pub mod api; // HTTP surface
pub mod config;
pub mod core_state; // Shared state behind the router
pub mod models;
pub mod db;
pub mod pipeline;
pub mod policy; // Receipt / approval thresholds
pub mod store; // In-memory entity graph + upload files

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize logging, build the core state and serve until Ctrl-C.
pub fn run() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    // Blocking HTTP clients live in the state: build and drop it outside
    // the async runtime.
    let state = Arc::new(core_state::CoreState::from_config(
        config::AppConfig::from_env(),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(api::serve(Arc::clone(&state)));
    drop(runtime);
    drop(state);

    if let Err(e) = &result {
        tracing::error!(error = %e, "Server exited with error");
    }
    result
}
