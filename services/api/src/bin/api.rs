//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, mailer::HttpMailNotifier, storage::LocalFileStorage},
    config::Config,
    error::ApiError,
    web::{router, AppState},
};
use readers_core::catalog::Catalog;
use readers_core::ports::FeedbackNotifier;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Storage and Notification Adapters ---
    let storage = Arc::new(LocalFileStorage::new(
        config.media_root.clone(),
        config.media_url.clone(),
    ));
    storage.ensure_root().await?;
    info!("Storing media under {}", storage.root().display());

    let notifier: Option<Arc<dyn FeedbackNotifier>> = match &config.mail {
        Some(mail) => {
            let notifier = HttpMailNotifier::new(mail.clone())
                .map_err(|e| ApiError::Internal(format!("Failed to build mail client: {}", e)))?;
            info!("Feedback emails go to {}", mail.feedback_email);
            Some(Arc::new(notifier) as Arc<dyn FeedbackNotifier>)
        }
        None => {
            warn!("MAIL_RELAY_URL is not set; feedback emails are disabled");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let catalog = Arc::new(Catalog::new(
        db_adapter.clone(),
        db_adapter.clone(),
        db_adapter.clone(),
        storage,
        notifier,
    ));
    let app_state = Arc::new(AppState::new(catalog, db_adapter, config.clone()));

    // --- 5. Create the Web Router ---
    let app = router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
