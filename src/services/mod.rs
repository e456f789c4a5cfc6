//! Business logic services

pub mod auth;
pub mod mailer;
pub mod rbac;
pub mod session;
pub mod shipments;
pub mod tracking;

pub use auth::AuthService;
pub use mailer::{Mailer, OutboundEmail};
pub use session::SessionManager;
pub use shipments::{NudgeOutcome, ShipmentEditor, ShipmentError, UpdateOutcome};
pub use tracking::TrackingFinder;
