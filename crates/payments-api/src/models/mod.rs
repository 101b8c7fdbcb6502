//! Data Transfer Objects (DTOs) for API requests and responses

pub mod common;
pub mod payments;
pub mod webhooks;

// Re-exports
pub use common::*;
pub use payments::*;
pub use webhooks::*;
