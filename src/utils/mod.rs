//! Shared helpers

pub mod error;
pub mod response;
pub mod validation;

pub use error::{AppError, AppResult, ErrorResponse};
pub use response::ApiResponse;
