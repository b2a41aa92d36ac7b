//! Utility modules

pub mod callbacks;
pub mod error;

pub use callbacks::{CallbackId, CallbackList};
pub use error::{AppError, AppResult, ErrorResponse};
