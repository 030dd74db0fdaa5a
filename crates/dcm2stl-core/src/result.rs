//! Convenience result type alias for dcm2stl.

use crate::error::AppError;

/// A specialized `Result` type for dcm2stl operations.
pub type AppResult<T> = Result<T, AppError>;
