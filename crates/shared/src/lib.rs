//! Shared library for the InfoPlus payments backend
//!
//! This crate provides common functionality used by the payments service:
//! - Database connection pooling and migrations
//! - Payment, reward and audit models matching the PostgreSQL schema
//! - Payment policy (amount bounds, point tiers)
//! - Error handling types
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod policy;

// Re-export commonly used types
pub use config::{Config, StorageBackend};
pub use db::DbPool;
pub use error::{Error, Result};
pub use models::{Amount, Operator, PaymentRecord, PaymentStatus, WebhookEventKind};
pub use policy::{PaymentPolicy, PointTier};

/// Initialize tracing subscriber for structured logging
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shared=debug,payments_api=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
