//! Error types for GrantScout

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrantScoutError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
