use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use siteforge::{
    config,
    db::{self, pool::ControlPool},
    state::AppState,
    tasks::dispatcher::{BackgroundCoordinator, Dispatcher},
    tasks::worker::{self, WorkerContext},
    tenant::provisioner::StoreProvisioner,
    tenant::registry::TenantRegistry,
    tenant::store::TenantRouter,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "siteforge", about = "Multi-tenant content-site control plane", version)]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, default_value = "siteforge.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise data directories and the control-plane database
    Bootstrap,
    /// Start the HTTP API server and the task workers
    Serve,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging from RUST_LOG (default: info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siteforge=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Bootstrap => bootstrap(cfg).await,
        Commands::Serve => serve(cfg).await,
    }
}

// ── Bootstrap ──────────────────────────────────────────────────────────────

async fn bootstrap(cfg: config::PlatformConfig) -> anyhow::Result<()> {
    info!("Starting bootstrap...");

    if let Some(parent) = cfg.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir: {}", parent.display()))?;
        }
    }
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("failed to create data dir: {}", cfg.data_dir.display()))?;

    let db_path = cfg
        .database_path
        .to_str()
        .context("database_path is not valid UTF-8")?;
    let pool = ControlPool::open(db_path, 1).context("failed to open control database")?;
    db::run_migrations(&pool).context("failed to run database migrations")?;
    info!("Control-plane migrations applied");

    info!(
        "Bootstrap complete: db={}, tenant stores={}",
        cfg.database_path.display(),
        cfg.data_dir.display()
    );
    Ok(())
}

// ── Serve ──────────────────────────────────────────────────────────────────

async fn serve(cfg: config::PlatformConfig) -> anyhow::Result<()> {
    let db_path = cfg
        .database_path
        .to_str()
        .context("database_path is not valid UTF-8")?
        .to_string();

    info!("Opening control database (4 reader connections)...");
    let pool = ControlPool::open(&db_path, 4).context("failed to open control database")?;
    db::run_migrations(&pool).context("failed to run database migrations")?;

    let registry = Arc::new(TenantRegistry::new(
        StoreProvisioner::new(&cfg.data_dir),
        Duration::from_secs(cfg.resolve_cache_ttl_secs),
    ));

    let (dispatcher, queue) = Dispatcher::new();
    let coordinator = BackgroundCoordinator::new();

    // Task workers. Each owns its own pool and router so one slow task never
    // contends with another worker's connection.
    for worker_id in 0..cfg.worker_count {
        let ctx = WorkerContext {
            db: ControlPool::open(&db_path, 1)
                .with_context(|| format!("failed to open worker {worker_id} pool"))?,
            registry: registry.clone(),
            router: TenantRouter::new(&cfg.data_dir),
            generation: cfg.generation.clone(),
            content_timeout: Duration::from_secs(cfg.content_task_timeout_secs),
            clone_timeout: Duration::from_secs(cfg.clone_task_timeout_secs),
            dispatcher: dispatcher.clone(),
        };
        let worker_queue = queue.clone();
        let shutdown_rx = coordinator.subscribe_shutdown();
        tokio::spawn(async move {
            worker::run(worker_id, ctx, worker_queue, shutdown_rx).await;
        });
    }
    info!("Background: {} task workers started", cfg.worker_count);

    // Resolve-cache sweep (every 5 minutes)
    let cleanup_registry = registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_registry.cleanup_cache();
        }
    });
    info!("Background: resolve-cache cleanup started (5min interval)");

    let state = AppState::new(cfg.clone(), pool, registry, dispatcher);
    let app = siteforge::routes::app(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Signal workers to stop after their current unit of work.
    coordinator.shutdown();
    info!("Workers signalled to stop.");

    info!("Server stopped.");
    Ok(())
}

// ── Graceful shutdown ──────────────────────────────────────────────────────

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("Shutdown signal received, stopping server...");
}
