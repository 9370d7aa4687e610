//! Application setup and wiring

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dockwatch_core::Config;
use dockwatch_core::config::{HistoryBackend, QueueBackend};
use dockwatch_orchestrator::application::{
    AdmissionController, MonitoringSessionManager, ScanHistoryService,
};
use dockwatch_orchestrator::domain::{ContainerRuntime, HistoryStore, JobQueue, RuntimeAnalyzer};
use dockwatch_orchestrator::infrastructure::{
    DockerCliConfig, DockerCliRuntime, DragonflyJobQueue, InMemoryHistoryStore, InMemoryJobQueue,
    NoopRuntimeAnalyzer, PgHistoryStore, spawn_dispatch_logger,
};
use dockwatch_orchestrator::presentation::{OrchestratorState, create_router};

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub shutdown_token: CancellationToken,
    /// Task consuming the in-process queue; `None` with an external queue
    pub dispatch_logger: Option<JoinHandle<()>>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn build_history_store(config: &Config) -> Result<Arc<dyn HistoryStore>, BoxError> {
    match config.history.backend {
        HistoryBackend::Memory => {
            tracing::warn!("Using in-memory scan history; records are lost on restart");
            Ok(Arc::new(InMemoryHistoryStore::new()))
        }
        HistoryBackend::Postgres => {
            let store = PgHistoryStore::connect(
                &config.history.database_url,
                config.history.max_connections,
                std::time::Duration::from_secs(config.history.connect_timeout_seconds),
            )
            .await?;
            if config.history.run_migrations {
                store.run_migrations().await?;
            }
            Ok(Arc::new(store))
        }
    }
}

async fn build_job_queue(
    config: &Config,
    shutdown_token: &CancellationToken,
) -> Result<(Arc<dyn JobQueue>, Option<JoinHandle<()>>), BoxError> {
    match config.queue.backend {
        QueueBackend::Memory => {
            tracing::warn!(
                "Using in-process job queue; jobs are logged, not analyzed, and their scans stay Analyzing"
            );
            let (queue, receiver) = InMemoryJobQueue::new(config.queue.capacity);
            let logger = spawn_dispatch_logger(receiver, shutdown_token.clone());
            Ok((Arc::new(queue), Some(logger)))
        }
        QueueBackend::Dragonfly => {
            let queue =
                DragonflyJobQueue::connect(&config.queue.dragonfly_url, &config.queue.queue_key)
                    .await?;
            tracing::info!(queue_key = %config.queue.queue_key, "Dispatching jobs to Dragonfly");
            Ok((Arc::new(queue), None))
        }
    }
}

/// Build the router and its collaborators from configuration
pub async fn create_app(config: Config) -> Result<AppHandle, BoxError> {
    let startup_time = Instant::now();
    let shutdown_token = CancellationToken::new();

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCliRuntime::new(DockerCliConfig::from(&config.docker)));
    let history_store = build_history_store(&config).await?;
    let (job_queue, dispatch_logger) = build_job_queue(&config, &shutdown_token).await?;
    let analyzer: Arc<dyn RuntimeAnalyzer> = Arc::new(NoopRuntimeAnalyzer);

    let admission = AdmissionController::new(
        runtime.clone(),
        history_store.clone(),
        job_queue,
    )
    .with_default_tag(config.docker.default_tag.clone())
    .with_dispatch_timeout(config.queue.enqueue_timeout());

    let monitoring = MonitoringSessionManager::new(
        runtime,
        history_store.clone(),
        analyzer,
        config.runtime_analysis.enabled,
    );
    if !config.runtime_analysis.enabled {
        tracing::info!("Runtime behaviour analysis disabled; monitoring endpoints answer 503");
    }

    let state = OrchestratorState {
        admission: Arc::new(admission),
        monitoring: Arc::new(monitoring),
        history: Arc::new(ScanHistoryService::new(history_store)),
    };

    let router = create_router(state, &config.server);

    tracing::info!(
        history_backend = ?config.history.backend,
        queue_backend = ?config.queue.backend,
        startup_ms = startup_time.elapsed().as_millis() as u64,
        "Application initialized"
    );

    Ok(AppHandle {
        router,
        shutdown_token,
        dispatch_logger,
    })
}
