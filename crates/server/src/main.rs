use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lottery_core::{
    create_execution_pipeline, create_solver, load_config, validate_config, AuditService,
    AuditStore, ExecutionService, LotteryEvents, LotteryOrchestrator, LotteryStore,
    Solver, SqliteAuditStore, SqliteLotteryStore,
};
use lottery_server::api::create_router;
use lottery_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for lottery lifecycle events
const EVENT_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,lottery_core=debug,tower_http=debug".into());
    let json = std::env::var("LOTTERY_LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    init_tracing();

    let config_path = std::env::var("LOTTERY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        solver = ?config.solver.kind,
        database = ?config.database.path,
        "Configuration loaded"
    );

    let lottery_store: Arc<dyn LotteryStore> = Arc::new(
        SqliteLotteryStore::new(&config.database.path)
            .context("Failed to open lottery store")?,
    );
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to open audit store")?,
    );
    let audit = AuditService::new(audit_store);
    info!("Stores initialized");

    let solver: Arc<dyn Solver> = Arc::from(create_solver(&config.solver, audit.clone()));
    let orchestrator = Arc::new(LotteryOrchestrator::new(
        solver,
        audit.clone(),
        Arc::clone(&lottery_store),
        LotteryEvents::new(EVENT_BUFFER_SIZE),
    ));
    info!(solver = orchestrator.solver_name(), "Orchestrator initialized");

    let settling = ExecutionService::new(Arc::clone(&lottery_store), audit.clone());
    let (handle, worker) =
        create_execution_pipeline(config.execution.queue_capacity, orchestrator, settling.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));
    info!("Execution worker started");

    let execution = settling.with_dispatcher(handle, config.execution.defer_dispatch);
    let state = Arc::new(AppState::new(config.clone(), execution, audit));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    // Err only means the worker already stopped on its own.
    let _ = shutdown_tx.send(());
    if let Err(e) = worker_handle.await {
        error!("Execution worker ended abnormally: {}", e);
    }
    info!("Execution worker stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
