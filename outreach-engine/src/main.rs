//! outreach-engine - B2B outbound campaign service
//!
//! REST + WebSocket API driving the campaign pipeline (classification,
//! contact retrieval, channel decision, content generation), the live
//! approval workflow, dispatch over Email/LinkedIn/Call, and voice-call
//! orchestration with session recovery.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use outreach_common::config::Settings;
use outreach_common::events::EventBus;
use outreach_engine::AppState;

#[derive(Parser, Debug)]
#[command(name = "outreach-engine", about = "Outbound campaign engine")]
struct Args {
    /// Address to bind the HTTP server on
    #[arg(long, env = "OUTREACH_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Path to the SQLite database file
    #[arg(long, env = "OUTREACH_DB_PATH", default_value = "outreach.db")]
    database: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting outreach-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", args.database.display());

    let db_pool = outreach_common::db::init_database(&args.database).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);
    let settings = Settings::from_env();

    let state = AppState::new(db_pool, event_bus, settings);
    let app = outreach_engine::build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!("Listening on http://{}", args.bind);
    info!("Health check: http://{}/health", args.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
