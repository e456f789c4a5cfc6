//! Data models

mod audit;
mod quote;
mod shipment;
mod user;

pub use audit::*;
pub use quote::*;
pub use shipment::*;
pub use user::*;
