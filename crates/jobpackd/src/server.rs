use std::{io, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use jobpack_api::{HttpApi, TaskManagerAdapter};
use jobpack_core::{BackendRef, TaskManager};
use jobpack_exec::{ClusterBackend, LocalParallelBackend};
use jobpack_prometheus::PrometheusMetrics;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info};

use crate::cli::{BackendKind, ServeArgs};

pub fn build_backend(args: &ServeArgs) -> BackendRef {
    match args.backend {
        BackendKind::Slurm => Arc::new(ClusterBackend::new(args.cluster_config())),
        BackendKind::Parallel => Arc::new(LocalParallelBackend::new(args.local_config())),
    }
}

/// Gateway routes, plus `/metrics` when `metrics` is set.
pub fn build_router(manager: Arc<TaskManager>, metrics: Option<PrometheusMetrics>) -> Router {
    let app = HttpApi::new(Arc::new(TaskManagerAdapter::new(manager))).router();
    match metrics {
        Some(metrics) => app.route(
            "/metrics",
            get(move || {
                let metrics = metrics.clone();
                async move { metrics_text(&metrics) }
            }),
        ),
        None => app,
    }
}

fn metrics_text(metrics: &PrometheusMetrics) -> Response {
    match metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Listening socket with an explicit accept backlog.
pub fn bind(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let backend = build_backend(&args);
    let cfg = args.manager_config(backend.timings());

    let metrics = if args.metrics {
        Some(PrometheusMetrics::new().context("create metrics")?)
    } else {
        None
    };
    let manager = Arc::new(match &metrics {
        Some(m) => TaskManager::with_metrics(backend, cfg, Arc::new(m.clone())),
        None => TaskManager::new(backend, cfg),
    });
    let app = build_router(manager.clone(), metrics);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = bind(addr, args.backlog).with_context(|| format!("bind {addr}"))?;
    info!(
        %addr,
        backend = manager.backend(),
        job_size = manager.job_size(),
        metrics = args.metrics,
        "listening"
    );
    info!("press Ctrl+C to stop");

    let shutdown = {
        let manager = manager.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for Ctrl+C");
            }
            info!("shutting down...");
            manager.shutdown();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    manager.join().await;
    info!("stopped");
    Ok(())
}
