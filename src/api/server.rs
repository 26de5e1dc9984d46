use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header, request::Parts},
    middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::{
    extract::origin_allowed,
    middleware::rate_limit,
    services::{
        add_task, complete_task, complete_tasks, delete_task, delete_tasks, edit_task, health,
        list_tasks, modify_task, sync_logs,
    },
    state::AppState,
    ws::stream_status,
};
use crate::config::Config;
use crate::ledger::JobLedger;
use crate::maintenance::MaintenanceWorker;
use crate::ratelimit::{JANITOR_INTERVAL, spawn_janitor};
use crate::taskwarrior::TaskCli;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every route; everything but `/health` sits behind the rate limiter.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// limiter can see the peer address.
pub fn router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/add-task", post(add_task))
        .route("/edit-task", post(edit_task))
        .route("/modify-task", post(modify_task))
        .route("/complete-task", post(complete_task))
        .route("/complete-tasks", post(complete_tasks))
        .route("/delete-task", post(delete_task))
        .route("/delete-tasks", post(delete_tasks))
        .route("/tasks", get(list_tasks))
        .route("/sync/logs", get(sync_logs))
        .route("/ws", get(stream_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let cors = cors_layer(state.config.server.frontend_origin.clone());

    Router::new()
        .route("/health", get(health))
        .merge(limited)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Browsers may call from the same origins the status stream accepts
fn cors_layer(frontend_origin: Option<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, parts: &Parts| {
            let host = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok());
            origin
                .to_str()
                .is_ok_and(|o| origin_allowed(o, frontend_origin.as_deref(), host))
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

/// Bootstrap every service and serve until a shutdown signal arrives.
pub async fn run(config: Config, address_override: Option<SocketAddr>) -> Result<(), AnyError> {
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    let address = address_override.unwrap_or(config.server.bind_addr);

    let ledger = if config.ledger.enabled {
        info!(path = %config.ledger.path.display(), "Opening job ledger");
        Some(
            JobLedger::open(&config.ledger.path)
                .map_err(|e| format!("Failed to open job ledger: {}", e))?,
        )
    } else {
        warn!("Job ledger disabled, jobs will not survive a restart");
        None
    };

    if config.executor.sync_origin.is_none() {
        warn!("No sync server origin configured, every job will fail");
    }
    let task_cli = Arc::new(TaskCli::new(
        config.executor.task_bin.clone(),
        config.executor.sync_origin.clone(),
    ));

    let maintenance = match &ledger {
        Some(ledger) => Some(
            MaintenanceWorker::new(
                ledger.clone(),
                &config.maintenance.cron,
                config.maintenance.retention_days,
            )
            .map_err(|e| format!("Invalid maintenance schedule: {}", e))?,
        ),
        None => None,
    };

    let state = AppState::new(config, ledger.clone(), task_cli.clone(), task_cli)
        .map_err(|e| format!("Invalid trusted proxy: {}", e))?;

    let cancel = CancellationToken::new();
    let mut tasks = vec![
        state.broadcaster.spawn_dispatcher(cancel.clone()),
        spawn_janitor(Arc::clone(&state.limiter), JANITOR_INTERVAL, cancel.clone()),
        state.queue.start(cancel.clone())?,
    ];
    if let Some(worker) = maintenance {
        tasks.push(tokio::spawn(worker.run(cancel.clone())));
    }

    // Recovered jobs are admitted before the listener opens
    let report = state.queue.recover().await?;
    info!(
        requeued = report.requeued,
        interrupted = report.interrupted,
        discarded = report.discarded,
        "Job recovery finished"
    );

    let app = router(state);
    let listener = TcpListener::bind(address).await?;
    info!(%address, "taskrelay listening");

    let shutdown = cancel.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        shutdown.cancel();
    })
    .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task failed");
        }
    }

    if let Some(ledger) = ledger {
        ledger.persist()?;
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
