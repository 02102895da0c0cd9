//! Main entry point for the radio call ingest server

use radiocall_api::{AppState, TranscriberProcessor, build_router};
use radiocall_core::{Config, context_error, context_error::Result, init_logging};
use radiocall_database::{AuditLog, Database};
use radiocall_queue::TranscriptionQueue;
use radiocall_transcriber::{NoopTranscriber, Transcriber};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging first
    init_logging()?;

    // Load configuration
    let config = Config::load().unwrap_or_else(|err| {
        info!("Failed to load config ({}), using defaults", err);
        Config::default()
    });

    info!(
        "Starting radio call ingest server on {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database connection
    info!("Connecting to database...");
    let database = match Database::new(&config).await {
        Ok(db) => {
            info!("Database connection established");
            db
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(context_error!("Database connection failed: {}", e));
        }
    };

    // Run database migrations
    info!("Running database migrations...");
    if let Err(e) = database.migrate().await {
        error!("Database migration failed: {}", e);
        return Err(context_error!("Migration failed: {}", e));
    }
    info!("Database migrations completed");

    if let Err(e) = database.health_check().await {
        error!("Database health check failed: {}", e);
        return Err(context_error!("Database health check failed: {}", e));
    }
    info!("Database health check passed");

    let pool = database.pool().clone();

    // Assemble the pipeline: audit sink, work queue, transcriber
    let audit = Arc::new(AuditLog::store_backed(pool.clone()));
    let queue = Arc::new(TranscriptionQueue::new(config.queue.clone()));
    let transcriber: Arc<dyn Transcriber> = Arc::new(
        NoopTranscriber::new(pool.clone()).with_model_name(config.transcription.model_name.clone()),
    );

    if config.transcription.enabled {
        queue.start(Arc::new(TranscriberProcessor::new(
            Arc::clone(&transcriber),
            pool.clone(),
        )));
    } else {
        info!("Transcription disabled; queue workers not started");
    }

    // Periodic reaper over finished task records
    let reaper = {
        let queue = Arc::clone(&queue);
        let retention = Duration::from_secs(config.queue.task_retention_hours * 3600);
        let every = Duration::from_secs(config.queue.cleanup_interval_minutes.max(1) * 60);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                queue.cleanup_old(retention);
            }
        })
    };

    let state = Arc::new(
        AppState::new(
            config.clone(),
            pool,
            audit,
            Arc::clone(&queue),
            transcriber,
        )
        .map_err(|e| context_error!("Failed to build application state: {}", e))?,
    );
    state.validate()?;

    let app = build_router(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| context_error!("Invalid server address: {}", e))?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| context_error!("Failed to bind to {}: {}", addr, e))?;

    info!("Server listening on http://{}", addr);
    info!("Health check available at: http://{}/health", addr);

    // Serve until a shutdown signal; the listener closes first so no new
    // admissions race the drain below
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| context_error!("Server error: {}", e))?;

    info!("Listener closed, draining queue...");
    reaper.abort();
    queue.stop().await;
    database.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
