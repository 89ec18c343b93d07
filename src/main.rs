use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use boutique_api as api;

use api::services::gateway::{PaymentGateway, StripeGateway, UnconfiguredGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = Arc::new(
        api::db::establish_connection(&cfg)
            .await
            .context("failed to connect to database")?,
    );
    if cfg.auto_migrate {
        api::db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;
    }

    let (event_sender, event_rx) = api::events::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    let auth_service = Arc::new(api::auth::AuthService::new(api::auth::AuthConfig {
        jwt_secret: cfg.jwt_secret.clone(),
        issuer: cfg.auth_issuer.clone(),
        audience: cfg.auth_audience.clone(),
        token_expiration: Duration::from_secs(cfg.jwt_expiration),
    }));

    let gateway: Arc<dyn PaymentGateway> = match cfg.stripe_secret_key.clone() {
        Some(secret) => Arc::new(StripeGateway::new(secret, cfg.stripe_api_base.clone())),
        None => {
            warn!("no stripe secret configured; card payment intents will fail");
            Arc::new(UnconfiguredGateway)
        }
    };

    let services = api::AppServices::build(
        db.clone(),
        event_sender.clone(),
        auth_service.clone(),
        gateway,
        &cfg,
    );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    let state = api::AppState {
        db,
        config: Arc::new(cfg),
        event_sender,
        auth_service,
        services,
    };
    let app = api::app_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "boutique-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
