//! Payments API Library
//!
//! Mobile-money payment origination and PaySuite webhook processing. Exposed as
//! a library for the binary and the integration tests.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod validators;
