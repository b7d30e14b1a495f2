// src/arbitrage/reporter.rs

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

use colored::Colorize;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::tracker::OpportunityTracker;
use crate::monitor::journal::ReportSink;

/// Finalizes opportunities that stopped being refreshed
pub struct StalenessReporter {
    tracker: Arc<OpportunityTracker>,
    sink: Arc<dyn ReportSink>,
    threshold: Duration,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl StalenessReporter {
    pub fn new(
        tracker: Arc<OpportunityTracker>,
        sink: Arc<dyn ReportSink>,
        threshold: Duration,
        interval: Duration,
        shutdown: Arc<AtomicBool>
    ) -> Self {
        Self {
            tracker,
            sink,
            threshold,
            interval,
            shutdown,
        }
    }

    /// Report every opportunity idle for longer than the threshold.
    /// Records are emitted after the tracker lock is released.
    pub fn sweep_once(&self) -> usize {
        let threshold = self.threshold;
        let mut reports = Vec::new();

        self.tracker.sweep(
            |opportunity| opportunity.last_update.elapsed() > threshold,
            |opportunity| reports.push(opportunity.report())
        );

        let count = reports.len();
        for report in reports {
            info!(
                id = %report.id,
                triangle = %report.triangle,
                qty_before = report.qty_before,
                qty_after = report.qty_after,
                duration_ms = report.duration_ms,
                scheduled = report.scheduled,
                "Found arb opportunity {} profit {}",
                report.path.green(),
                format!("{:.4}%", report.profit_percentage).bright_green()
            );
            self.sink.report(report);
        }
        count
    }

    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            threshold_ms = self.threshold.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "Staleness reporter started"
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            interval.tick().await;
            self.sweep_once();
        }

        // whatever went stale before shutdown still gets reported
        self.sweep_once();
        info!("Staleness reporter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::test_support::{ btc_eth_usdt, observation };
    use crate::models::opportunity::OpportunityReport;
    use crate::monitor::journal::MemoryJournal;

    fn reporter(
        tracker: &Arc<OpportunityTracker>,
        journal: &Arc<MemoryJournal<OpportunityReport>>,
        shutdown: &Arc<AtomicBool>
    ) -> StalenessReporter {
        StalenessReporter::new(
            tracker.clone(),
            journal.clone(),
            Duration::from_millis(100),
            Duration::from_millis(20),
            shutdown.clone()
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_stale_opportunity_exactly_once() {
        let tracker = Arc::new(OpportunityTracker::new(Duration::from_secs(5)));
        let journal = Arc::new(MemoryJournal::new());
        let reporter = reporter(&tracker, &journal, &Arc::new(AtomicBool::new(false)));
        let triangle = btc_eth_usdt();

        let id = tracker.upsert(&triangle, 163, observation(&triangle, 0.0163)).id();
        tokio::time::advance(Duration::from_millis(30)).await;
        tracker.upsert(&triangle, 163, observation(&triangle, 0.0163));

        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(reporter.sweep_once(), 0);

        tokio::time::advance(Duration::from_millis(30)).await;
        assert_eq!(reporter.sweep_once(), 1);
        assert_eq!(reporter.sweep_once(), 0);

        let records = journal.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.triangle, "BTCETHUSDT");
        assert_eq!(record.path, "BTC->USDT->ETH->BTC");
        assert!((record.duration_ms - 30.0).abs() < 1e-6);
        assert!((record.profit_percentage - 1.63).abs() < 1e-9);
        assert!(!record.scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_on_cadence() {
        let tracker = Arc::new(OpportunityTracker::new(Duration::from_secs(5)));
        let journal = Arc::new(MemoryJournal::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let reporter = Arc::new(reporter(&tracker, &journal, &shutdown));
        let triangle = btc_eth_usdt();

        let handle = tokio::spawn(reporter.run());
        tracker.upsert(&triangle, 1, observation(&triangle, 0.0001));
        tracker.upsert(&triangle, 2, observation(&triangle, 0.0002));

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(journal.records().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(journal.records().len(), 2);

        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();
        assert_eq!(journal.records().len(), 2);
    }
}
