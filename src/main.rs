use fractus::{
    AppState, ContentState, CredentialState, SessionState,
    config::{AppConfig, Env},
    create_router, db,
    posts::PostgresContentStore,
    session::PostgresSessionStore,
    users::PostgresCredentialStore,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point, responsible for initializing configuration,
/// logging, the database, the three stores and the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & environment loading (fail-fast).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging filter setup. RUST_LOG wins, with sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fractus=debug,tower_http=info,axum=trace".into());

    // 3. Structured logging, formatted per environment: pretty output for
    // local debugging, JSON for log aggregators in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database initialization and schema bootstrap.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    db::migrate(&pool)
        .await
        .expect("FATAL: Failed to apply database schema.");

    // 5. Store instantiation, each behind its capability trait.
    let content = Arc::new(PostgresContentStore::new(pool.clone())) as ContentState;
    let users = Arc::new(PostgresCredentialStore::new(pool.clone())) as CredentialState;
    let sessions = Arc::new(PostgresSessionStore::new(pool)) as SessionState;

    // 6. Unified state assembly; the protected-rule table is built here.
    let app_state = AppState::new(content, users, sessions, config.clone());

    // 7. Router and server startup.
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("FATAL: Failed to bind listener.");

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("API documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await.unwrap();
}
