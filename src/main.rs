//! Krishi Desk - support requests for farmer field services

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use krishi_desk::{config::Args, db::MongoClient, logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init_tracing(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Krishi Desk - farmer support desk");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    info!("Uploads: {}", args.upload_dir.display());
    info!(
        "Transitions: {}",
        if args.strict_transitions { "strict" } else { "permissive" }
    );
    info!(
        "SMS: {}",
        args.sms_webhook_url.as_deref().unwrap_or("log only")
    );
    if let Some(path) = &args.audit_log {
        info!("Audit log: {}", path.display());
    }
    info!("======================================");

    // In-memory storage is only acceptable in dev mode
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory storage): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = server::AppState::build(args.clone(), mongo).await?;

    if let (Some(identifier), Some(password)) = (&args.admin_identifier, &args.admin_password) {
        let admin = state.accounts.bootstrap_admin(identifier, password).await?;
        info!("Bootstrap admin ready: {}", admin.identifier);
    }

    server::run(Arc::new(state)).await?;

    Ok(())
}
