use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::infrastructure::correlation_tracker::CorrelationTracker;

/// Periodically expires overdue correlations and purges old closed ones.
///
/// Expiry also happens on access, so the sweeper only bounds how long an
/// untouched entry can linger. Call [`ExpirySweeper::start`] to launch the
/// loop inside a `tokio::spawn`.
pub struct ExpirySweeper {
    tracker: CorrelationTracker,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(tracker: CorrelationTracker, interval: Duration) -> Self {
        Self {
            tracker,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Start the sweep loop. The task runs until aborted or the process exits.
    pub fn start(self) -> JoinHandle<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "Correlation sweeper starting");
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.tracker.sweep().await;
            let pending = self.tracker.pending_count().await;
            let tracked = self.tracker.len().await;
            if report.expired > 0 || report.purged > 0 {
                info!(
                    expired = report.expired,
                    purged = report.purged,
                    pending,
                    tracked,
                    "Correlation sweep"
                );
            } else {
                debug!(pending, tracked, "Correlation sweep found nothing to do");
            }
        }
    }
}
