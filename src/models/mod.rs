//! Data models

mod invoice;
mod log;
mod user;

pub use invoice::*;
pub use log::*;
pub use user::*;
