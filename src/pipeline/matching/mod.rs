//! Document item → GL line matching.

pub mod matcher;
pub mod scoring;
pub mod summary;

pub use matcher::*;
pub use scoring::*;
pub use summary::*;
