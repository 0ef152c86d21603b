use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::sync::service::{SyncReport, Synchronizer};

/// Background task running a full sweep on a fixed interval.
///
/// Runs independently of sweeps triggered over HTTP; both only upsert, so
/// overlapping runs are harmless.
pub struct SyncScheduler {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    last_report: Arc<RwLock<Option<SyncReport>>>,
}

impl SyncScheduler {
    /// Start the sweep loop.
    ///
    /// The first sweep happens after one interval, or immediately when
    /// `run_on_startup` is set. Ticks missed while a sweep is still running
    /// are delayed rather than fired in a burst.
    pub fn spawn(synchronizer: Synchronizer, interval: Duration, run_on_startup: bool) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let last_report = Arc::new(RwLock::new(None));

        let handle = tokio::spawn(Self::run(
            rx,
            synchronizer,
            interval,
            run_on_startup,
            last_report.clone(),
        ));

        tracing::info!(
            interval_secs = interval.as_secs(),
            run_on_startup,
            "Periodic index sync scheduled"
        );

        Self {
            shutdown_tx: Some(tx),
            handle: Some(handle),
            last_report,
        }
    }

    /// Report of the most recent scheduled sweep.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    /// Shared handle to the last report, for readers that outlive `self`.
    pub fn last_report_handle(&self) -> Arc<RwLock<Option<SyncReport>>> {
        self.last_report.clone()
    }

    /// Stop the loop. A sweep already in progress finishes first.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Sync scheduler task ended abnormally: {}", e);
            }
        }
    }

    async fn run(
        mut shutdown_rx: mpsc::Receiver<()>,
        synchronizer: Synchronizer,
        period: Duration,
        run_on_startup: bool,
        last_report: Arc<RwLock<Option<SyncReport>>>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !run_on_startup {
            // The first tick completes immediately.
            interval.tick().await;
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Sync scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match synchronizer.sync_all().await {
                        Ok(report) => *last_report.write() = Some(report),
                        Err(e) => tracing::error!("Scheduled index sync failed: {}", e),
                    }
                }
            }
        }
    }
}
