//! Example extension that attaches a request-scoped record during the
//! access phase and reads it back during the log phase.
//!
//! The record lives in an indexed per-request variable slot, so it survives
//! internal redirects within one request and drops with the request.

pub mod app;
pub mod handlers;

pub use app::build_pipeline;
pub use handlers::{PersistentData, PersistentDataExt, VARIABLE_NAME};
