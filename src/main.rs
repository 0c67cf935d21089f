use anyhow::Context;
use customer_api::{
    AppConfig, AppState,
    config::Env,
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects to PostgreSQL, makes sure
/// the `customers` table exists, then serves HTTP until interrupted.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration & Environment Loading
    // A missing .env file is fine; the real environment still applies.
    dotenv::dotenv().ok();

    // 2. Logging, before anything else can fail. APP_ENV picks the format.
    let env = Env::from_env();
    init_tracing(env);

    let config = AppConfig::load().context("invalid configuration")?;
    tracing::info!("Application starting in {:?} mode", config.env);
    if config.protect_updates {
        tracing::info!("PUT /customers/{{id}} requires authentication");
    }

    // 3. Database Connection & Schema
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .context("failed to connect to Postgres, check DATABASE_URL")?;

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;
    repo.ensure_schema()
        .await
        .context("failed to create the customers table")?;

    // 4. Router Assembly
    let bind_addr = config.bind_addr;
    let app = create_router(AppState::new(repo, config))?;

    // 5. Server Start
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API documentation available at http://{}/swagger-ui", bind_addr);

    // Ctrl-C stops accepting connections and lets in-flight requests finish.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Pretty output for local runs, JSON lines in production. `RUST_LOG`
/// overrides the default filter.
fn init_tracing(env: Env) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "customer_api=debug,tower_http=info".into());

    match env {
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
}
