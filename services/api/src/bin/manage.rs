//! services/api/src/bin/manage.rs
//!
//! Administrative commands run against the configured database and media root.

use api_lib::{
    adapters::{db::DbAdapter, storage::LocalFileStorage},
    config::Config,
    error::ApiError,
    web::auth::hash_password,
};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use readers_core::catalog::{Catalog, WorkbookUpload};
use readers_core::domain::{CollectionFilter, NewCollection, Visibility};
use readers_core::ports::{CredentialStore, PortError};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "manage", about = "Administrative commands for the readers backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an API user that can obtain a token.
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Seed an empty database with a released en-US v1.0 collection.
    ///
    /// Workbook N is read from `workbook-NN.pdf` and `workbook-NN.json`.
    Seed {
        #[arg(long, default_value = "development_data/chapters")]
        chapters_dir: PathBuf,
        #[arg(long, default_value = "development_data/pdfs")]
        pdfs_dir: PathBuf,
        #[arg(long, default_value_t = 36)]
        count: i32,
    },
    /// Delete every collection along with its workbooks and PDFs.
    DeleteAllCollections,
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    db_adapter.run_migrations().await?;

    let storage = Arc::new(LocalFileStorage::new(
        config.media_root.clone(),
        config.media_url.clone(),
    ));
    storage.ensure_root().await?;
    let catalog = Catalog::new(
        db_adapter.clone(),
        db_adapter.clone(),
        db_adapter.clone(),
        storage,
        None,
    );

    match cli.command {
        Command::CreateUser { username, password } => {
            create_user(db_adapter.as_ref(), &username, &password).await
        }
        Command::Seed {
            chapters_dir,
            pdfs_dir,
            count,
        } => seed(&catalog, &chapters_dir, &pdfs_dir, count).await,
        Command::DeleteAllCollections => delete_all_collections(&catalog).await,
    }
}

async fn create_user(
    credentials: &dyn CredentialStore,
    username: &str,
    password: &str,
) -> Result<(), ApiError> {
    let password_hash = hash_password(password)?;
    let user = credentials.create_user(username, &password_hash).await?;
    info!(user_id = user.id, "Created user '{}'", user.username);
    Ok(())
}

async fn seed(
    catalog: &Catalog,
    chapters_dir: &Path,
    pdfs_dir: &Path,
    count: i32,
) -> Result<(), ApiError> {
    let existing = catalog
        .list_collections(&CollectionFilter::default(), Visibility::All)
        .await?;
    if !existing.is_empty() {
        warn!("Database is not empty. Skipping seeding.");
        return Ok(());
    }

    let collection = catalog
        .create_collection(NewCollection {
            major_version: 1,
            minor_version: 0,
            localization: "en-US".to_string(),
        })
        .await?;

    for number in 1..=count {
        let stem = format!("workbook-{:02}", number);
        let pdf_name = format!("{}.pdf", stem);
        let pdf = tokio::fs::read(pdfs_dir.join(&pdf_name)).await?;
        let chapters_text = tokio::fs::read_to_string(chapters_dir.join(format!("{}.json", stem))).await?;
        let chapters: Value = serde_json::from_str(&chapters_text).map_err(|e| {
            ApiError::Internal(format!("Chapters of workbook {} are not JSON: {}", number, e))
        })?;

        let upload = WorkbookUpload {
            number,
            collection: collection.id,
            chapters,
            pdf_name,
            pdf: Bytes::from(pdf),
        };
        match catalog.create_workbook(upload).await {
            Ok(_) => info!("Successfully created workbook {}", number),
            Err(PortError::Validation(errors)) => {
                error!("Error creating workbook {}: {}", number, errors);
                return Err(PortError::Validation(errors).into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    catalog.set_released(collection.id, true).await?;
    info!(
        collection_id = collection.id,
        "Seeded and released en-US v1.0 with {} workbooks", count
    );
    Ok(())
}

async fn delete_all_collections(catalog: &Catalog) -> Result<(), ApiError> {
    let collections = catalog
        .list_collections(&CollectionFilter::default(), Visibility::All)
        .await?;
    for collection in &collections {
        catalog.delete_collection(collection.id).await?;
    }
    info!("Successfully deleted {} collections", collections.len());
    Ok(())
}
