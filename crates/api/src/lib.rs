//! GrantScout API Library
//!
//! HTTP surface for subscription state, usage limits and grant recommendations.

pub mod auth;
pub mod config;
pub mod error;
pub mod grants;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
