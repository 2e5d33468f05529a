use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use common::api::CycleReport;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn init_metrics_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("metrics recorder already installed")
        })
        .clone()
}

/// Serve `/metrics` until the shutdown future resolves. Used by monitor mode;
/// one-shot commands never bind a port.
pub async fn serve_metrics_with_shutdown<S>(
    handle: PrometheusHandle,
    addr: SocketAddr,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let body = handle.render();
            async move {
                (
                    StatusCode::OK,
                    [(
                        axum::http::header::CONTENT_TYPE,
                        "text/plain; version=0.0.4",
                    )],
                    body,
                )
            }
        }),
    );

    let listener = TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr().unwrap_or(addr);
    info!(%bound_addr, "metrics server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn record_cycle(report: &CycleReport, duration: Duration) {
    let result = if report.is_all_success() {
        "success"
    } else {
        "partial"
    };

    counter!(
        "bmcfleet_cycles_total",
        "result" => result.to_string()
    )
    .increment(1);

    histogram!(
        "bmcfleet_cycle_duration_ms",
        "result" => result.to_string()
    )
    .record(duration.as_secs_f64() * 1000.0);

    gauge!("bmcfleet_targets").set(report.total as f64);

    for outcome in &report.outcomes {
        counter!(
            "bmcfleet_outcomes_total",
            "kind" => outcome.kind.as_str().to_string()
        )
        .increment(1);
        counter!("bmcfleet_attempts_total").increment(outcome.attempts as u64);
    }
}

pub fn record_persist_failure() {
    counter!("bmcfleet_persist_failures_total").increment(1);
}
