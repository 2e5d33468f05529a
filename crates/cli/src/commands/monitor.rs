use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tracing::error;

use common::api::{ActionKind, ActionRequest};
use engine::monitor::{monitor_loop, MonitorOptions};
use engine::sink::{CsvFileSink, FanoutSink, JsonSnapshotSink, ReportSink};
use engine::telemetry;

use crate::args::MonitorArgs;
use crate::commands::CommandContext;

pub async fn handle_monitor(ctx: &CommandContext, args: MonitorArgs) -> anyhow::Result<()> {
    let registry = ctx.load_registry()?;

    let mut sinks: Vec<Box<dyn ReportSink>> = Vec::new();
    if let Some(path) = &args.output_csv {
        sinks.push(Box::new(CsvFileSink::appending(path)));
    }
    if let Some(dir) = &args.json_dir {
        sinks.push(Box::new(JsonSnapshotSink::new(dir)));
    }
    if sinks.is_empty() {
        anyhow::bail!("monitor needs a durable sink; pass --output-csv and/or --json-dir");
    }
    let sink = FanoutSink::new(sinks);

    let interval = args
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.cfg.monitor_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if args.serve_metrics || ctx.cfg.serve_metrics {
        let handle = telemetry::init_metrics_recorder();
        let addr: SocketAddr = format!("{}:{}", ctx.cfg.metrics_host, ctx.cfg.metrics_port)
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid metrics bind address: {err}"))?;
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown_fut = async move {
                if *shutdown.borrow() {
                    return;
                }
                let _ = shutdown.changed().await;
            };
            if let Err(err) = telemetry::serve_metrics_with_shutdown(handle, addr, shutdown_fut).await
            {
                error!(error = %err, "metrics server exited with error");
            }
        });
    }

    println!(
        "Monitoring {} target(s) every {}s; press Ctrl+C to stop.",
        registry.len(),
        interval.as_secs()
    );

    let summary = monitor_loop(
        registry.targets(),
        &ActionRequest::new(ActionKind::Metrics),
        ctx.client.clone(),
        &ctx.cfg,
        &sink,
        shutdown_rx,
        MonitorOptions {
            interval,
            max_cycles: args.iterations,
        },
    )
    .await?;

    println!("Monitoring stopped after {} cycle(s).", summary.cycles);
    if summary.persist_failures > 0 {
        eprintln!(
            "Warning: {} cycle report(s) could not be persisted.",
            summary.persist_failures
        );
    }
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                None
            }
        };
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
