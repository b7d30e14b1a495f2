// src/arbitrage/detector.rs

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{ self, error::TrySendError };
use tokio::time::Instant;
use tracing::{ debug, info, trace };
use uuid::Uuid;

use super::executor::EligibilityPolicy;
use super::sim_trader::{ simulate, FeeSchedule };
use super::tracker::{ Observation, OpportunityTracker, ProfitBucketing, Upsert };
use super::triangle_index::TriangleIndex;
use crate::models::ticker::MarketSnapshot;
use crate::models::triangle::Triangle;

/// Triangles evaluated between two yields to the scheduler
const SCAN_CHUNK: usize = 256;

/// Interval of the stats log line
const STATS_INTERVAL: Duration = Duration::from_secs(60);

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct DetectorStats {
    passes: AtomicUsize,
    profitable: AtomicUsize,
    created: AtomicUsize,
    dispatched: AtomicUsize,
    dropped: AtomicUsize,
    ineligible: AtomicUsize,
}

/// Queue to the execution side plus the filter applied before offering
struct Dispatch {
    tx: mpsc::Sender<Uuid>,
    policy: Arc<dyn EligibilityPolicy>,
}

/// Scans every triangle against the market snapshot, pass after pass
pub struct DetectionLoop {
    triangles: Vec<Arc<Triangle>>,
    snapshot: Arc<dyn MarketSnapshot>,
    fees: FeeSchedule,
    tracker: Arc<OpportunityTracker>,
    bucketing: ProfitBucketing,
    /// Taken when `run` returns so the receiving side sees the channel close
    dispatch: Mutex<Option<Dispatch>>,
    min_scan_interval: Duration,
    stats: DetectorStats,
    shutdown: Arc<AtomicBool>,
}

impl DetectionLoop {
    pub fn new(
        index: &TriangleIndex,
        snapshot: Arc<dyn MarketSnapshot>,
        fees: FeeSchedule,
        tracker: Arc<OpportunityTracker>,
        bucketing: ProfitBucketing,
        shutdown: Arc<AtomicBool>
    ) -> Self {
        Self {
            triangles: index.to_sorted_vec(),
            snapshot,
            fees,
            tracker,
            bucketing,
            dispatch: Mutex::new(None),
            min_scan_interval: Duration::ZERO,
            stats: DetectorStats::default(),
            shutdown,
        }
    }

    /// Offer unscheduled opportunities that pass `policy` to the execution side
    pub fn with_dispatch(
        mut self,
        tx: mpsc::Sender<Uuid>,
        policy: Arc<dyn EligibilityPolicy>
    ) -> Self {
        *self.dispatch.get_mut() = Some(Dispatch { tx, policy });
        self
    }

    pub fn with_min_scan_interval(mut self, interval: Duration) -> Self {
        self.min_scan_interval = interval;
        self
    }

    /// Simulate A -> B -> C -> A starting from one unit of A.
    ///
    /// `None` when any leg lacks market data.
    pub fn evaluate(&self, triangle: &Triangle) -> Option<Observation> {
        let [(ab, a), (bc, b), (ac, c)] = triangle.legs();
        let snapshot = self.snapshot.as_ref();

        let first = simulate(1.0, ab, a, snapshot, &self.fees).ok()?;
        let second = simulate(first.qty_out, bc, b, snapshot, &self.fees).ok()?;
        let third = simulate(second.qty_out, ac, c, snapshot, &self.fees).ok()?;

        let qty_after = third.qty_out;
        Some(Observation {
            qty_before: 1.0,
            qty_after,
            profit: qty_after - 1.0,
            legs: [first, second, third],
        })
    }

    /// Evaluate one triangle and record it when strictly profitable
    pub fn scan_triangle(&self, triangle: &Arc<Triangle>) -> Option<Upsert> {
        let observation = self.evaluate(triangle)?;
        if observation.profit <= 0.0 {
            return None;
        }

        let bucket = self.bucketing.bucket(observation.profit);
        let profit = observation.profit;
        let outcome = self.tracker.upsert(triangle, bucket, observation);

        self.stats.profitable.fetch_add(1, Ordering::Relaxed);
        if let Upsert::Created(id) = outcome {
            self.stats.created.fetch_add(1, Ordering::Relaxed);
            debug!(%id, triangle = %triangle.path(), profit, "New opportunity");
        }
        if outcome.is_unscheduled() {
            self.offer(triangle, profit, outcome.id());
        }

        Some(outcome)
    }

    fn offer(&self, triangle: &Triangle, profit: f64, id: Uuid) {
        let guard = self.dispatch.lock();
        let Some(dispatch) = guard.as_ref() else {
            return;
        };
        if !dispatch.policy.is_eligible(triangle, profit) {
            self.stats.ineligible.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match dispatch.tx.try_send(id) {
            Ok(()) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(%id, "Dispatch queue full, opportunity dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// One full pass over the index, returns the number of profitable triangles
    pub fn scan_once(&self) -> usize {
        let profitable = self.triangles
            .iter()
            .filter(|triangle| self.scan_triangle(triangle).is_some())
            .count();
        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        profitable
    }

    /// Scan until shutdown, yielding every chunk and after every pass
    pub async fn run(self: Arc<Self>) {
        info!(triangles = self.triangles.len(), "Detection loop started");

        while !self.shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();

            for chunk in self.triangles.chunks(SCAN_CHUNK) {
                for triangle in chunk {
                    self.scan_triangle(triangle);
                }
                tokio::task::yield_now().await;
            }
            self.stats.passes.fetch_add(1, Ordering::Relaxed);
            let elapsed = started.elapsed();
            if elapsed < self.min_scan_interval {
                tokio::time::sleep(self.min_scan_interval - elapsed).await;
            } else {
                tokio::task::yield_now().await;
            }
        }

        self.dispatch.lock().take();
        info!("Detection loop stopped");
    }

    /// Run a periodic task to print statistics
    pub async fn run_stats_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SHUTDOWN_POLL);
        let mut last_report = Instant::now();

        while !self.shutdown.load(Ordering::Relaxed) {
            interval.tick().await;
            if last_report.elapsed() < STATS_INTERVAL {
                continue;
            }
            last_report = Instant::now();

            let passes = self.stats.passes.swap(0, Ordering::Relaxed);
            let profitable = self.stats.profitable.swap(0, Ordering::Relaxed);
            let created = self.stats.created.swap(0, Ordering::Relaxed);
            let dispatched = self.stats.dispatched.swap(0, Ordering::Relaxed);
            let dropped = self.stats.dropped.swap(0, Ordering::Relaxed);
            let ineligible = self.stats.ineligible.swap(0, Ordering::Relaxed);

            info!(
                passes,
                profitable,
                created,
                dispatched,
                dropped,
                ineligible,
                tracked = self.tracker.len(),
                "Detection stats"
            );
        }
    }

    pub fn passes(&self) -> usize {
        self.stats.passes.load(Ordering::Relaxed)
    }
}
