//! swinglab-va - Swing Video Analysis service
//!
//! Ingests short golf-swing clips, prepares the container, gates analysis
//! behind a motion precheck, and derives swing timing events and coaching
//! metrics from per-frame object-detection payloads, exposed as idempotent
//! asynchronous jobs.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use swinglab_common::events::EventBus;

use swinglab_va::config::AnalysisConfig;
use swinglab_va::AppState;

#[derive(Debug, Parser)]
#[command(name = "swinglab-va", about = "SwingLab Video Analysis service")]
struct Args {
    /// Data root folder (media, prepared cache, job store)
    #[arg(long)]
    root: Option<String>,

    /// HTTP port override
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting swinglab-va (Swing Video Analysis) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve data root
    let root = swinglab_common::config::resolve_root_folder(args.root.as_deref(), "SWINGLAB_ROOT");
    info!("Data root: {}", root.display());

    // Step 2: Ensure media/prepared layout exists
    swinglab_common::config::ensure_root_layout(&root)
        .map_err(|e| anyhow::anyhow!("Failed to initialize data root: {}", e))?;

    // Step 3: Resolve service configuration
    let config = Arc::new(AnalysisConfig::resolve(root, args.port)?);

    // Step 4: Open or create the job store
    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = swinglab_va::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Event bus for pipeline observability
    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let port = config.port;
    let state = AppState::new(db_pool, event_bus, config);
    let app = swinglab_va::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
