//! Type definitions for signoff storage.

mod edit_requests;
mod evidence;
mod ids;
mod links;
mod users;

// Re-export all types from submodules
pub use edit_requests::*;
pub use evidence::*;
pub use ids::*;
pub use links::*;
pub use users::*;
