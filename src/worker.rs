// UVE dispatch loop: periodically builds every VM's messages and forwards
// the changed ones to the transport channel.

use crate::models::UveMessage;
use crate::uve_table::VmUveTable;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Table, output channel and shutdown for the worker.
pub struct WorkerDeps {
    pub table: Arc<VmUveTable>,
    pub tx: mpsc::Sender<UveMessage>,
    pub messages_sent_total: Arc<AtomicU64>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

pub struct WorkerConfig {
    pub dispatch_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        table,
        tx,
        messages_sent_total,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        dispatch_interval_ms,
        stats_log_interval_secs,
    } = config;

    let worker_span = tracing::span!(tracing::Level::DEBUG, "uve_worker", dispatch_interval_ms);

    let task = async move {
        let mut tick = interval(Duration::from_millis(dispatch_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        'dispatch: loop {
            tokio::select! {
                _ = tick.tick() => {
                    for msg in table.collect_changed() {
                        let vm = msg.vm_name().to_string();
                        if tx.send(msg).await.is_err() {
                            // Messages of this pass are already cached as sent.
                            tracing::warn!(vm = %vm, "transport channel closed, UVE worker stopping");
                            break 'dispatch;
                        }
                        messages_sent_total.fetch_add(1, Ordering::Relaxed);
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("UVE worker shutting down");
                    break 'dispatch;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        vm_count = table.vm_count(),
                        messages_sent_total = messages_sent_total.load(Ordering::Relaxed),
                        "app stats"
                    );
                }
            }
        }
    };

    tokio::spawn(task.instrument(worker_span))
}
