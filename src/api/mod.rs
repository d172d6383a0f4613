//! HTTP surface for the audit workflow.
//!
//! `api_router()` returns a composable `Router`; `serve()` binds it to the
//! configured address and runs until Ctrl-C.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, serve_on};
pub use types::ApiContext;
