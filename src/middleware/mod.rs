//! HTTP middleware

pub mod auth;
pub mod client_meta;

pub use auth::{admin_middleware, auth_middleware, AuthUser};
pub use client_meta::ClientMeta;
