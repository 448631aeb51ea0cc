//! Quill API Library
//!
//! HTTP server components for the Quill chat backend.

pub mod auth;
pub mod config;
pub mod error;
pub mod provider;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
