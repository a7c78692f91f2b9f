//! Storage abstraction for the evidence sign-off workflow.
//!
//! Backend crates (signoff-store-sqlite, signoff-store-postgres) implement [`Store`] so the
//! workflow never depends on a specific database engine or schema details.

mod store;
pub mod types;

pub use store::*;
pub use types::*;

use thiserror::Error;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// A conditional write lost its race (stale version, consumed link, decided request).
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
