use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use fingerprint_proxy::config::ServerConfig;
use fingerprint_proxy::error::Error;
use fingerprint_proxy::handler::{self, AppState};
use fingerprint_proxy::metrics::ServerMetrics;

const METRICS_EMISSION_PERIOD: Duration = Duration::from_secs(30);

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ServerConfig::from_env();
    init_tracing(&config.log_level);

    let addr = format!("0.0.0.0:{}", config.port);
    let (metrics, mut log_rx, mut monitor_rx) = ServerMetrics::new();
    metrics.start_periodic_emission(METRICS_EMISSION_PERIOD);

    // Drain the event channels so they never back up; a real deployment
    // would forward these to a log sink or websocket, but a complete build
    // still needs a consumer so the bounded channels don't fill and start
    // dropping events under light load.
    tokio::spawn(async move {
        while let Some(entry) = log_rx.recv().await {
            tracing::debug!(
                method = %entry.method,
                url = %entry.url,
                profile = %entry.profile,
                status = entry.status,
                duration_ms = entry.duration_ms,
                "request log"
            );
        }
    });
    tokio::spawn(async move {
        while let Some(event) = monitor_rx.recv().await {
            tracing::trace!(?event, "monitor event");
        }
    });

    let state = Arc::new(AppState::new(config, Arc::clone(&metrics)));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "fingerprint proxy listening");

    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight requests");
        shutdown_signal.notify_waiters();
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, std::convert::Infallible>(handler::handle(state, req, remote_addr).await) }
                    });

                    if let Err(err) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        tracing::debug!(error = %err, "connection closed with error");
                    }
                });
            }
            _ = shutdown.notified() => {
                tracing::info!("closing session cache and exiting");
                state.sessions.close_all();
                break;
            }
        }
    }

    Ok(())
}
