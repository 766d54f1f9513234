use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planforge_api::bridge::BridgeLimits;
use planforge_api::config::ServerConfig;
use planforge_api::router::build_app_router;
use planforge_api::state::AppState;
use planforge_builder::{Builder, BuilderConfig};
use planforge_worker::{retention, JobEvent, JobEventBus, JobRegistry, Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "planforge_api=debug,planforge_worker=debug,planforge_builder=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let subscriber = tracing_subscriber::registry().with(filter);
    if json_logs {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let scheduler_config = SchedulerConfig::from_env();
    tracing::info!(
        queue_capacity = scheduler_config.queue_capacity,
        job_timeout_secs = scheduler_config.job_timeout.as_secs(),
        "Loaded scheduler configuration",
    );

    let builder_config = BuilderConfig::from_env();

    // --- Builder ---
    let builder = Builder::from_config(&builder_config).expect("Failed to load document template");
    let store = builder.store().clone();
    tracing::info!(output_dir = %store.root().display(), "Builder ready");

    // --- Scheduler ---
    let registry = Arc::new(JobRegistry::new());
    let events = Arc::new(JobEventBus::default());
    let (scheduler, authority) = Scheduler::new(
        Arc::clone(&registry),
        Arc::clone(&events),
        builder,
        &scheduler_config,
    );
    let authority_thread = authority
        .spawn()
        .expect("Failed to spawn the model authority thread");
    tracing::info!("Model authority thread started");

    // --- Background services ---
    let cancel = CancellationToken::new();

    let watchdog_handle = tokio::spawn(
        scheduler
            .watchdog()
            .run(scheduler_config.watchdog_interval, cancel.clone()),
    );
    let retention_handle = tokio::spawn(retention::run(
        Arc::clone(&registry),
        store.clone(),
        scheduler_config.job_retention,
        cancel.clone(),
    ));
    let event_log_handle = tokio::spawn(log_job_events(events.subscribe(), cancel.clone()));

    // --- App state ---
    let state = AppState {
        scheduler: scheduler.clone(),
        store,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Bridge ---
    let bridge_handle = match config.bridge_port {
        Some(port) => {
            let addr = SocketAddr::new(
                config.host.parse().expect("Invalid HOST address"),
                port,
            );
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .expect("Failed to bind bridge address");
            Some(tokio::spawn(planforge_api::bridge::serve(
                listener,
                app.clone(),
                BridgeLimits {
                    max_body: config.max_upload_bytes,
                    read_timeout: Duration::from_secs(config.request_timeout_secs),
                },
                cancel.clone(),
            )))
        }
        None => None,
    };

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    if let Some(handle) = bridge_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), watchdog_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), event_log_handle).await;
    tracing::info!("Background services stopped");

    // Dropping the last handle closes the queue; the authority thread drains
    // what is already queued and exits.
    drop(scheduler);
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(
        shutdown_timeout,
        tokio::task::spawn_blocking(move || authority_thread.join()),
    )
    .await
    {
        Ok(Ok(Ok(()))) => tracing::info!("Model authority thread stopped"),
        Ok(_) => tracing::error!("Model authority thread panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            pending = registry.len(),
            "Model authority thread still busy, exiting anyway"
        ),
    }

    tracing::info!("Graceful shutdown complete");
}

/// Log every job lifecycle event until `cancel` is triggered.
async fn log_job_events(mut rx: broadcast::Receiver<JobEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => match &event.error {
                    Some(error) => tracing::info!(
                        job_id = %event.job_id,
                        event = event.event_type.as_str(),
                        code = ?error.code,
                        step_index = ?error.step_index,
                        message = %error.message,
                        "Job event",
                    ),
                    None => tracing::info!(
                        job_id = %event.job_id,
                        event = event.event_type.as_str(),
                        "Job event",
                    ),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
