//! Endpoint handlers, one module per resource.

pub mod docs;
pub mod gl;
pub mod health;
pub mod policy;
pub mod review;
