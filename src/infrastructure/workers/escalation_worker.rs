use crate::application::services::EscalationService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the escalation sweep on a fixed interval until cancelled.
#[derive(Clone)]
pub struct EscalationWorker {
    service: EscalationService,
    interval: Duration,
}

impl EscalationWorker {
    pub fn new(service: EscalationService, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Start the sweep loop in the background.
    ///
    /// Cancellation is only observed between ticks, so a sweep in progress
    /// always finishes before the task exits. Await the handle on shutdown.
    #[must_use]
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            info!(
                "Escalation worker started, sweeping every {:?}",
                worker.interval
            );
            let mut interval = tokio::time::interval(worker.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("Escalation worker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        worker.service.tick().await;
                    }
                }
            }
        })
    }
}
