//! RequirementIQ - account and session backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use requirementiq::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxAuditRepository, SqlxTokenRepository, SqlxUserRepository},
    },
    services::{AccountService, SessionManager},
};

/// How often expired revocation records are swept
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "requirementiq=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RequirementIQ backend...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Fail fast on a missing signing secret rather than at first login
    config.auth.signing_secret()?;

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let token_repo = SqlxTokenRepository::boxed(pool.clone());
    let audit_repo = SqlxAuditRepository::boxed(pool.clone());

    // Initialize services
    let account_service = Arc::new(AccountService::new(user_repo.clone()));
    let session_manager = Arc::new(SessionManager::new(
        &config.auth,
        token_repo,
        user_repo,
        audit_repo,
    )?);

    // Sweep expired revocation records in the background
    {
        let manager = session_manager.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match manager.cleanup_expired().await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "Swept expired token records");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Token sweep failed: {:#}", e),
                }
            }
        });
    }

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        account_service,
        session_manager,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
