//! Business logic services

pub mod audit;
pub mod auth;
pub mod geoip;
pub mod invoice;
pub mod qr;

pub use audit::AuditService;
pub use auth::AuthService;
pub use geoip::GeoipService;
pub use invoice::{InvoiceService, SubmitOutcome};
