//! Movie catalogue HTTP API.
//!
//! A single `movies` resource with optimistic concurrency control: every
//! record carries a `version` that writers must present, and a write against
//! a stale version is rejected instead of overwriting newer data.

pub mod app;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
pub mod store;

pub use app::build_router;
