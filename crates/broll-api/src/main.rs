//! Axum API server binary.
//!
//! Runs the HTTP API, the worker pool and the reaper in one process; they
//! share the in-memory task store.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use broll_api::{create_router, metrics, ApiConfig, AppState};
use broll_media::{FetchConfig, HttpFetcher};
use broll_queue::{InMemoryTaskStore, QueueConfig, TaskQueue, TaskStore};
use broll_storage::ArtifactStore;
use broll_worker::{ProcessingContext, Reaper, TaskExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing();
    info!("Starting broll-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, public_base_url={}",
        config.host, config.port, config.public_base_url
    );
    info!(
        "Worker config: max_tasks={}, timeout={}s, retention={}s, overlap={}",
        worker_config.max_concurrent_tasks,
        worker_config.task_timeout.as_secs(),
        worker_config.retention.as_secs(),
        worker_config.overlap_policy
    );

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let artifacts = ArtifactStore::new(
        &worker_config.work_dir,
        &worker_config.output_dir,
        &config.public_base_url,
    );
    if let Err(e) = artifacts.ensure_dirs().await {
        error!("Failed to create work/output directories: {}", e);
        std::process::exit(1);
    }

    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let queue = Arc::new(TaskQueue::new(QueueConfig {
        capacity: config.queue_capacity,
    }));

    let probe = match HttpFetcher::new(FetchConfig {
        probe_timeout: config.probe_timeout,
        ..worker_config.fetch_config()
    }) {
        Ok(probe) => Arc::new(probe),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match ProcessingContext::new(worker_config.clone(), Arc::clone(&store), artifacts.clone()) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("Failed to create processing context: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(TaskExecutor::new(ctx, Arc::clone(&queue)));
    let executor_handle = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            if let Err(e) = executor.run().await {
                error!("Task executor stopped with error: {}", e);
            }
        })
    };

    let (reaper_shutdown, reaper_rx) = watch::channel(false);
    let reaper = Reaper::new(
        Arc::clone(&store),
        artifacts.clone(),
        worker_config.retention,
        worker_config.reaper_interval,
    );
    let reaper_handle = tokio::spawn(async move { reaper.run(reaper_rx).await });

    let state = AppState::new(
        config.clone(),
        store,
        Arc::clone(&queue),
        probe,
        artifacts,
        worker_config.max_total_bytes(),
    );
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address: {}", e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // Stop the executor and let in-flight tasks finish, then close the
    // queue and stop the reaper.
    executor.shutdown();
    if let Err(e) = executor_handle.await {
        error!("Task executor panicked: {}", e);
    }
    queue.close();
    let _ = reaper_shutdown.send(true);
    let _ = reaper_handle.await;

    info!("Server shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("broll=info,tower_http=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
