use lms_portal::{
    AppState,
    audit::{AuditSink, PgAuditStore},
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes Configuration, Logging, Database, Storage, Audit and the HTTP Server.
/// Startup failures are fatal; nothing here runs per request.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for this crate and request summaries from tower-http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lms_portal=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Audit Sink
    // Uses its own short-lived connections rather than the request pool.
    let audit = AuditSink::new(Arc::new(PgAuditStore::new(config.db_url.clone())));

    // 6. Storage Initialization (S3/MinIO)
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    )
    .await;

    // LOCAL-ONLY: provision the MinIO bucket.
    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }

    let storage = Arc::new(s3_client) as StorageState;

    // 7. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        storage,
        audit,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {}: {}", bind_addr, e));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
    }
}
