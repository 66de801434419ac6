// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use exam_engine::config::Config;
use exam_engine::exam::{ExamEngine, OsEntropy};
use exam_engine::routes;
use exam_engine::seed::seed_question_bank;
use exam_engine::state::AppState;
use exam_engine::store::{ExamStore, MemoryStore, PgExamStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "exam-engine.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn ExamStore> = match &config.database_url {
        Some(url) => {
            let pool = connect_with_retry(url).await?;
            tracing::info!("Database connected...");

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");

            if config.seed_bank_path.is_some() {
                tracing::warn!("SEED_BANK_PATH is ignored when DATABASE_URL is set");
            }

            Arc::new(PgExamStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, exam data lives in memory only");
            let store = MemoryStore::new();

            // Seed Question Bank
            if let Some(path) = &config.seed_bank_path {
                match seed_question_bank(&store, path).await {
                    Ok(count) => tracing::info!("Loaded {} certification(s) from {}", count, path),
                    Err(e) => tracing::error!("Failed to seed question bank: {}", e),
                }
            }

            Arc::new(store)
        }
    };

    let engine = ExamEngine::new(store, Arc::new(OsEntropy), config.default_passing_score);

    // Create AppState
    let state = AppState {
        engine,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    // Start the server
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize Database Pool with Retry
async fn connect_with_retry(url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
