//! passport-gate - battery passport lifecycle gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passport_gate::{
    config::{Args, StorageBackend},
    db::{MemoryStore, MongoClient, MongoStore, Stores},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("passport_gate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  passport-gate");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Storage: {}", args.storage_backend.as_str());
    info!("Single-use links: {}", args.single_use_links);
    info!("Audit write mode: {}", args.audit_write_mode.as_str());
    if let Some(path) = &args.activity_log_path {
        info!("Activity log: {}", path.display());
    }
    info!("======================================");

    let stores = match args.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage (state is lost on restart)");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Mongo => {
            info!("MongoDB: {}", args.mongodb_uri);
            let client = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
            let store = MongoStore::new(&client).await?;
            info!("MongoDB collections ready in '{}'", client.db_name());
            Stores::from_backend(Arc::new(store))
        }
    };

    let state = Arc::new(AppState::build(args, stores).await?);

    if let Err(e) = server::run(state).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
