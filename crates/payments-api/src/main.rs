//! Payments API for the InfoPlus mobile app
//!
//! Originates M-Pesa/e-Mola payments through PaySuite and applies the gateway's
//! webhooks to the payment state machine.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use shared::{db, Config, StorageBackend};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use payments_api::middleware::{self, PrometheusMetrics, RequestId};
use payments_api::repositories::{
    MemoryStore, PaymentStore, PgPaymentStore, PgRewardLedger, PgWebhookAudit, RewardLedger,
    WebhookAudit,
};
use payments_api::routes;
use payments_api::services::{
    FcmNotifier, LogNotifier, NoReplica, Notifier, ParseReplica, PaySuiteClient,
    PaymentReplica, PaymentService, PaymentStateMachine, SignatureVerifier, WebhookIngress,
};

/// Storage and notification collaborators for the selected backend
struct Backend {
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<dyn RewardLedger>,
    audit: Arc<dyn WebhookAudit>,
    notifier: Arc<dyn Notifier>,
}

async fn build_backend(config: &Config) -> anyhow::Result<Backend> {
    match config.storage {
        StorageBackend::Postgres => {
            let db_pool = db::create_pool(&config.database)
                .await
                .context("Failed to create database pool")?;

            db::run_migrations(&db_pool)
                .await
                .context("Failed to run database migrations")?;

            db::check_health(&db_pool)
                .await
                .context("Database health check failed")?;

            let notifier: Arc<dyn Notifier> =
                match FcmNotifier::from_config(&config.notifications, db_pool.clone()) {
                    Some(fcm) => Arc::new(fcm),
                    None => {
                        tracing::warn!("FCM_SERVER_KEY not set, push notifications disabled");
                        Arc::new(LogNotifier)
                    }
                };

            Ok(Backend {
                payments: Arc::new(PgPaymentStore::new(db_pool.clone())),
                ledger: Arc::new(PgRewardLedger::new(db_pool.clone())),
                audit: Arc::new(PgWebhookAudit::new(db_pool)),
                notifier,
            })
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            Ok(Backend {
                payments: store.clone(),
                ledger: store.clone(),
                audit: store,
                notifier: Arc::new(LogNotifier),
            })
        }
    }
}

fn build_replica(config: &Config) -> anyhow::Result<Arc<dyn PaymentReplica>> {
    match &config.replica {
        Some(replica) => {
            let parse = ParseReplica::new(replica).context("Failed to create Parse replica")?;
            tracing::info!(server_url = %replica.server_url, "Parse replica enabled");
            Ok(Arc::new(parse))
        }
        None => {
            tracing::info!("Parse replica not configured");
            Ok(Arc::new(NoReplica))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    shared::init_tracing();

    tracing::info!("Starting Payments API...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    middleware::init_metrics().context("Failed to install Prometheus recorder")?;

    let backend = build_backend(&config).await?;
    let replica = build_replica(&config)?;

    let gateway =
        Arc::new(PaySuiteClient::new(&config.paysuite).context("Failed to create PaySuite client")?);
    if config.paysuite.api_key.is_none() {
        tracing::warn!("PAYSUITE_API_KEY not set, payment creation will fail");
    }

    let verifier = SignatureVerifier::new(
        config.paysuite.webhook_secret.as_deref(),
        config.paysuite.tolerance_secs,
    );
    if !verifier.is_configured() {
        tracing::warn!("PAYSUITE_WEBHOOK_SECRET not set, every webhook will be rejected");
    }

    let machine = Arc::new(PaymentStateMachine::new(
        backend.payments.clone(),
        backend.ledger.clone(),
        backend.notifier.clone(),
        replica.clone(),
    ));
    let ingress = web::Data::new(WebhookIngress::new(
        verifier,
        machine.clone(),
        backend.audit.clone(),
    ));
    let service = web::Data::new(PaymentService::new(
        backend.payments.clone(),
        gateway,
        replica,
        machine,
        config.policy.clone(),
    ));

    let server_addr = format!("{}:{}", config.server.host, config.server.port);
    let jwt_secret = config.server.jwt_secret.clone();
    tracing::info!("Payments API listening on {}", server_addr);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(PrometheusMetrics::new())
            .wrap(RequestId::new())
            .wrap(TracingLogger::default())
            .wrap(middleware::cors())
            .app_data(service.clone())
            .app_data(ingress.clone())
            .configure(|cfg| routes::configure(cfg, &jwt_secret))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind to {}", server_addr))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
