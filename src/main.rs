use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use vm_uve::directory::{InMemoryDirectory, InMemoryStats, SystemClock, UveContext};
use vm_uve::models::UveMessage;
use vm_uve::{config, routes, uve_table, worker};

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Stand-in for the collector transport: logs each UVE as JSON.
fn spawn_transport(mut rx: mpsc::Receiver<UveMessage>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => tracing::info!(vm = %msg.vm_name(), uve = %json, "uve sent"),
                Err(e) => tracing::warn!(error = %e, operation = "encode_uve", "UVE encode failed"),
            }
        }
        tracing::debug!("Transport shutting down");
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let directory = Arc::new(InMemoryDirectory::new());
    let stats = Arc::new(InMemoryStats::new());
    let table = Arc::new(uve_table::VmUveTable::new(UveContext {
        interfaces: directory.clone(),
        vns: directory,
        stats,
        clock: Arc::new(SystemClock),
        hostname: app_config.hostname(),
        bandwidth_interval_usecs: app_config.agent.bandwidth_interval_usecs,
    }));
    tracing::info!(
        vrouter = %table.context().hostname,
        bandwidth_interval_usecs = app_config.agent.bandwidth_interval_usecs,
        "UVE table ready"
    );

    let (tx, rx) = mpsc::channel::<UveMessage>(app_config.uve.channel_capacity);
    let transport_handle = spawn_transport(rx);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            table: table.clone(),
            tx,
            messages_sent_total: Arc::new(AtomicU64::new(0)),
            shutdown_rx,
        },
        worker::WorkerConfig {
            dispatch_interval_ms: app_config.uve.dispatch_interval_ms,
            stats_log_interval_secs: app_config.uve.stats_log_interval_secs,
        },
    );

    let app = routes::app(table);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Introspect listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
            let _ = transport_handle.await;
        }
    }

    Ok(())
}
