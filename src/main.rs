//! Platform sync service
//!
//! Composition root: loads configuration, wires the in-memory stores and
//! the event bus into the services, and runs the consumer and scheduler
//! tasks until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use platform_sync::application::services::revocation::RevocationAuthority;
use platform_sync::domain::RepositoryProvider;
use platform_sync::shared::{listen_for_shutdown_signals, OwnerLocks, ShutdownSignal};
use platform_sync::{
    create_event_bus, default_config_path, start_subscription_expiry_task, AppConfig,
    EventConsumer, HttpRevocationAuthority, InMemoryRepositoryProvider, RevocationGuard,
    SubscriptionService, SyncService, TokenLedgerService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("PLATFORM_SYNC_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_tracing(&cfg.logging.level);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            let cfg = AppConfig::default();
            init_tracing(&cfg.logging.level);
            error!("Failed to load config: {}. Using defaults.", e);
            cfg
        }
    };

    info!(service = %config.service.name, "Starting platform sync service...");

    // ── Stores and bus ─────────────────────────────────────────
    let repos: Arc<dyn RepositoryProvider> = Arc::new(InMemoryRepositoryProvider::new());
    let event_bus = create_event_bus();
    info!("Event bus initialized");

    // ── Services ───────────────────────────────────────────────
    // The ledger engine and revocation guard belong to the inbound
    // transport surface, which is out of scope for this binary; they are
    // wired here so the composition stays in one place.
    let _ledger_service = Arc::new(TokenLedgerService::new(
        repos.clone(),
        event_bus.clone(),
        Arc::new(OwnerLocks::new()),
        config.pricing_table(),
        config.ledger_config(),
    ));
    let subscription_service = Arc::new(SubscriptionService::new(
        repos.clone(),
        event_bus.clone(),
        Arc::new(OwnerLocks::new()),
    ));
    let sync_service = Arc::new(SyncService::new(
        repos.clone(),
        event_bus.clone(),
        config.sync_config(),
    ));

    let authority: Arc<dyn RevocationAuthority> = Arc::new(HttpRevocationAuthority::new(
        config.revocation.authority_url.clone(),
        Duration::from_secs(config.revocation.request_timeout_secs),
    )?);
    let _revocation_guard = Arc::new(RevocationGuard::new(authority, config.guard_config()));

    // ── Background tasks ───────────────────────────────────────
    let shutdown = ShutdownSignal::new();
    tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

    let consumer_handle =
        EventConsumer::new(event_bus.clone(), sync_service.clone()).start(shutdown.clone());

    let expiry_handle = start_subscription_expiry_task(
        subscription_service.clone(),
        shutdown.clone(),
        config.scheduler.check_interval_secs,
    );

    info!("All tasks started. Press Ctrl+C to shutdown gracefully.");

    // ── Run until shutdown ─────────────────────────────────────
    shutdown.wait().await;
    info!("Shutting down...");

    for (name, handle) in [("consumer", consumer_handle), ("expiry", expiry_handle)] {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(())) => info!("{} task stopped", name),
            Ok(Err(e)) => error!("{} task panicked: {}", name, e),
            Err(_) => warn!("{} task did not stop in time", name),
        }
    }

    info!("Platform sync service shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
