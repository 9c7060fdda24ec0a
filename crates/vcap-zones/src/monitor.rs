//! Runs a [`ZoneEvaluator`] on its own task, fed by a snapshot channel.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::error::{Result, ZoneError};
use crate::evaluator::{Alert, FrameSnapshot, ZoneEvaluator};

/// What happens to open alerts when the monitor stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Close them with the last snapshot's timestamp
    #[default]
    FlushOpen,
    /// Keep them open in the returned evaluator so evaluation can resume
    LeaveOpen,
}

/// Alert opens and closes, in the order the evaluator produced them.
pub type AlertStream = UnboundedReceiverStream<Alert>;

/// Handle to a running monitor. Dropping it stops the monitor.
pub struct ZoneMonitor {
    stop: mpsc::Sender<()>,
    task: JoinHandle<ZoneEvaluator>,
}

impl ZoneMonitor {
    /// Consume `snapshots` until the channel closes or [`ZoneMonitor::stop`]
    /// is called.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        mut evaluator: ZoneEvaluator,
        mut snapshots: mpsc::Receiver<FrameSnapshot>,
        policy: StopPolicy,
    ) -> (Self, AlertStream) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        info!("✿ Zone monitor starting ({} zones)", evaluator.zones().count());

        let task = tokio::spawn(async move {
            let mut ingested = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.recv() => {
                        info!("Zone monitor stopping");
                        break;
                    }
                    snapshot = snapshots.recv() => {
                        let Some(snapshot) = snapshot else { break };
                        match evaluator.ingest(&snapshot) {
                            Ok(frame) => {
                                ingested += 1;
                                for event in frame.events {
                                    let _ = alert_tx.send(event);
                                }
                            }
                            // The snapshot is dropped, the stream goes on
                            Err(e) => warn!("Skipping snapshot: {}", e),
                        }
                    }
                }
            }

            if policy == StopPolicy::FlushOpen {
                if let Some(last) = evaluator.last_timestamp() {
                    match evaluator.flush(last) {
                        Ok(closed) => {
                            for alert in closed {
                                let _ = alert_tx.send(alert);
                            }
                        }
                        Err(e) => warn!("Failed to flush open alerts: {}", e),
                    }
                }
            }

            info!(
                "❀ Zone monitor stopped after {} snapshots, {} alerts open",
                ingested,
                evaluator.open_alerts().len()
            );
            evaluator
        });

        let stream = UnboundedReceiverStream::new(alert_rx);
        (Self { stop: stop_tx, task }, stream)
    }

    /// Stop consuming, apply the stop policy and hand back the evaluator.
    /// Snapshots still queued in the channel are not evaluated.
    pub async fn stop(self) -> Result<ZoneEvaluator> {
        let _ = self.stop.send(()).await;
        self.join().await
    }

    /// Wait for the snapshot channel to close, then apply the stop policy.
    pub async fn join(self) -> Result<ZoneEvaluator> {
        // Dropping the stop sender would end the loop, keep it until the task is done
        let Self { stop, task } = self;
        let result = task.await;
        drop(stop);
        result.map_err(|e| ZoneError::MonitorFailed(e.to_string()))
    }
}
