use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use streamchat::agent::RigGenerator;
use streamchat::config::AppConfig;
use streamchat::db::memory::MemoryStore;
use streamchat::db::session_repository::SessionRepository;
use streamchat::db::user_repository::UserRepository;
use streamchat::db::{SessionStore, UserStore};
use streamchat::errors::AppError;
use streamchat::routes::create_router;
use streamchat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamchat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Storage ───────────────────────────────────────────────────────────────
    let (sessions, users): (Arc<dyn SessionStore>, Arc<dyn UserStore>) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(database_url)
                    .await
                    .map_err(AppError::DatabaseConnectionFailed)?;

                sqlx::migrate!("./migrations").run(&pool).await?;
                info!("Database connection established and migrations applied");

                let sessions: Arc<dyn SessionStore> = Arc::new(SessionRepository::new(pool.clone()));
                let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool));
                (sessions, users)
            }
            None => {
                warn!("DATABASE_URL not set; sessions and accounts are kept in memory only");
                let store = Arc::new(MemoryStore::new());
                let sessions: Arc<dyn SessionStore> = store.clone();
                let users: Arc<dyn UserStore> = store;
                (sessions, users)
            }
        };

    // ── Upstream client (one per process) ─────────────────────────────────────
    let generator = Arc::new(RigGenerator::new(&config.provider)?);

    let app = create_router(AppState::new(generator, sessions, users));

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
    }
}
