//! Utility modules

pub mod error;
pub mod net;

pub use error::{AppError, AppResult};
