//! Topout competition server.
//!
//! ```bash
//! TOPOUT_FIXTURE=./open.json TOPOUT_PORT=8080 topout-server
//! ```

use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use topout_runtime::metrics::MetricsServer;
use topout_scoring::InMemoryRepository;
use topout_server::{AppState, ResultsHub, ServerConfig, build_router, load_fixture};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(?config, "Starting topout server");

    let mut metrics = MetricsServer::new();
    metrics.start()?;

    let repo = InMemoryRepository::new();
    if let Some(path) = &config.fixture {
        let fixture = load_fixture(path)?;
        info!(
            path = %path.display(),
            competition_id = %fixture.competition_id,
            categories = fixture.categories.len(),
            climbers = fixture.climbers.len(),
            "Fixture loaded"
        );
        repo.load(fixture).await;
    } else {
        warn!("No TOPOUT_FIXTURE set, starting with an empty repository");
    }

    let state = AppState::new(Arc::new(repo), ResultsHub::new(config.broadcast_capacity))
        .with_metrics(metrics);
    let app = build_router(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    let stopping = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let stopping = Arc::clone(&stopping);
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    });

    // Live feeds stay open until the client leaves, so draining is bounded.
    let timeout = config.shutdown_timeout();
    tokio::select! {
        result = server.into_future() => result?,
        () = async {
            stopping.notified().await;
            tokio::time::sleep(timeout).await;
        } => warn!(timeout_secs = timeout.as_secs(), "Connections still open, stopping anyway"),
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
