// src/arbitrage/tracker.rs

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::opportunity::{ LegQuote, Opportunity, OpportunityKey };
use crate::models::triangle::Triangle;

/// Discretizes relative profit so small fluctuations update one opportunity
#[derive(Debug, Clone, Copy)]
pub struct ProfitBucketing {
    width: f64,
}

impl ProfitBucketing {
    pub fn from_bps(bps: f64) -> Self {
        let width = if bps.is_finite() && bps > 0.0 { bps / 10_000.0 } else { 1.0 / 10_000.0 };
        Self { width }
    }

    #[inline]
    pub fn bucket(&self, profit: f64) -> i64 {
        (profit / self.width).floor() as i64
    }
}

/// Result of one profitable observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created(Uuid),
    Refreshed {
        id: Uuid,
        scheduled: bool,
    },
}

impl Upsert {
    #[inline]
    pub fn id(&self) -> Uuid {
        match self {
            Upsert::Created(id) | Upsert::Refreshed { id, .. } => *id,
        }
    }

    /// Not yet handed to execution
    #[inline]
    pub fn is_unscheduled(&self) -> bool {
        !matches!(self, Upsert::Refreshed { scheduled: true, .. })
    }
}

/// Simulated cycle to record
#[derive(Debug, Clone)]
pub struct Observation {
    pub qty_before: f64,
    pub qty_after: f64,
    pub profit: f64,
    pub legs: [LegQuote; 3],
}

#[derive(Default)]
struct TrackerState {
    live: AHashMap<OpportunityKey, Opportunity>,
    ids: AHashMap<Uuid, OpportunityKey>,
}

/// Shared opportunity store. Every read and write goes through one mutex.
pub struct OpportunityTracker {
    state: Mutex<TrackerState>,
    /// How long reported opportunities stay queryable before eviction
    retention: Duration,
}

impl OpportunityTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            retention,
        }
    }

    /// Create the opportunity for (triangle, bucket) or refresh its last update.
    /// A refresh only moves `last_update`: profit, quantities and leg prices stay
    /// those of the first observation, which is what execution trades on.
    ///
    /// An entry that was already reported belongs to a finished episode and is
    /// replaced by a fresh opportunity.
    pub fn upsert(
        &self,
        triangle: &Arc<Triangle>,
        profit_bucket: i64,
        observation: Observation
    ) -> Upsert {
        let now = Instant::now();
        let key = OpportunityKey {
            triangle: triangle.key.clone(),
            profit_bucket,
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(existing) = state.live.get_mut(&key) {
            if !existing.reported {
                existing.last_update = now;
                return Upsert::Refreshed {
                    id: existing.id,
                    scheduled: existing.scheduled,
                };
            }
            state.ids.remove(&existing.id);
        }

        let id = Uuid::new_v4();
        let opportunity = Opportunity {
            id,
            triangle: Arc::clone(triangle),
            profit_bucket,
            qty_before: observation.qty_before,
            qty_after: observation.qty_after,
            profit_relative: observation.profit,
            legs: observation.legs,
            started_at: Utc::now(),
            start: now,
            last_update: now,
            reported: false,
            reported_at: None,
            scheduled: false,
        };

        state.ids.insert(id, key.clone());
        state.live.insert(key, opportunity);
        Upsert::Created(id)
    }

    /// Mark every unreported entry matching `is_stale` as reported and hand it to
    /// `action`, then evict reported entries older than the retention period.
    /// Returns the number of entries reported by this call.
    pub fn sweep<P, A>(&self, is_stale: P, mut action: A) -> usize
        where P: Fn(&Opportunity) -> bool, A: FnMut(&Opportunity)
    {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut reported = 0;
        for opportunity in state.live.values_mut() {
            if opportunity.reported || !is_stale(opportunity) {
                continue;
            }
            opportunity.reported = true;
            opportunity.reported_at = Some(now);
            action(opportunity);
            reported += 1;
        }

        let retention = self.retention;
        let ids = &mut state.ids;
        state.live.retain(|_, opportunity| {
            let expired = opportunity.reported_at.is_some_and(
                |at| now.saturating_duration_since(at) >= retention
            );
            if expired {
                ids.remove(&opportunity.id);
            }
            !expired
        });

        reported
    }

    /// Flag an opportunity for execution. False when it is unknown, already
    /// scheduled, or already reported.
    pub fn mark_scheduled(&self, id: Uuid) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(key) = state.ids.get(&id) else {
            return false;
        };
        match state.live.get_mut(key) {
            Some(opportunity) if !opportunity.scheduled && !opportunity.reported => {
                opportunity.scheduled = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Opportunity> {
        let state = self.state.lock();
        state.ids.get(&id).and_then(|key| state.live.get(key)).cloned()
    }

    /// Entries currently held, reported ones awaiting eviction included
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::test_support::{ btc_eth_usdt, observation };
    use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
    use std::thread;

    fn older_than(threshold: Duration) -> impl Fn(&Opportunity) -> bool {
        move |opportunity| opportunity.last_update.elapsed() > threshold
    }

    #[test]
    fn test_bucketing() {
        let buckets = ProfitBucketing::from_bps(1.0);
        assert_eq!(buckets.bucket(0.00011), 1);
        assert_eq!(buckets.bucket(0.00019), 1);
        assert_eq!(buckets.bucket(0.0163), 163);
        assert_eq!(ProfitBucketing::from_bps(0.0).bucket(0.00025), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_refreshes_same_key() {
        let tracker = OpportunityTracker::new(Duration::ZERO);
        let triangle = btc_eth_usdt();

        let first = tracker.upsert(&triangle, 12, observation(&triangle, 0.0012));
        tokio::time::advance(Duration::from_millis(5)).await;
        let mut moved = observation(&triangle, 0.00121);
        moved.legs[0].price *= 1.0001;
        let second = tracker.upsert(&triangle, 12, moved);
        let other = tracker.upsert(&triangle, 13, observation(&triangle, 0.0013));

        assert!(matches!(first, Upsert::Created(_)));
        assert_eq!(second, Upsert::Refreshed { id: first.id(), scheduled: false });
        assert_ne!(other.id(), first.id());
        assert_eq!(tracker.len(), 2);

        let refreshed = tracker.get(first.id()).unwrap();
        assert_eq!(refreshed.observed_for(), Duration::from_millis(5));
        // the first observation's numbers are kept
        assert_eq!(refreshed.profit_relative, 0.0012);
        assert_eq!(refreshed.legs[0].price, observation(&triangle, 0.0012).legs[0].price);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_reports_stale_once() {
        let tracker = OpportunityTracker::new(Duration::from_secs(1));
        let triangle = btc_eth_usdt();
        let threshold = Duration::from_millis(50);

        let stale = tracker.upsert(&triangle, 1, observation(&triangle, 0.0001));
        tokio::time::advance(Duration::from_millis(40)).await;
        let fresh = tracker.upsert(&triangle, 2, observation(&triangle, 0.0002));
        tokio::time::advance(Duration::from_millis(20)).await;

        let mut seen = Vec::new();
        assert_eq!(tracker.sweep(older_than(threshold), |o| seen.push(o.id)), 1);
        assert_eq!(seen, vec![stale.id()]);

        // a second pass does not report it again
        assert_eq!(tracker.sweep(older_than(threshold), |o| seen.push(o.id)), 0);
        assert!(tracker.get(stale.id()).unwrap().reported);
        assert!(!tracker.get(fresh.id()).unwrap().reported);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_entries_are_evicted_and_replaced() {
        let tracker = OpportunityTracker::new(Duration::from_millis(100));
        let triangle = btc_eth_usdt();

        let first = tracker.upsert(&triangle, 3, observation(&triangle, 0.0003));
        tokio::time::advance(Duration::from_millis(60)).await;
        tracker.sweep(older_than(Duration::from_millis(50)), |_| {});

        // same key after the episode was reported starts a new opportunity
        let second = tracker.upsert(&triangle, 3, observation(&triangle, 0.0003));
        assert!(matches!(second, Upsert::Created(_)));
        assert_ne!(second.id(), first.id());
        assert!(tracker.get(first.id()).is_none());
        assert_eq!(tracker.len(), 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        tracker.sweep(older_than(Duration::from_millis(50)), |_| {});
        assert_eq!(tracker.len(), 1);
        tokio::time::advance(Duration::from_millis(100)).await;
        tracker.sweep(older_than(Duration::from_millis(50)), |_| {});
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_mark_scheduled_once() {
        let tracker = OpportunityTracker::new(Duration::ZERO);
        let triangle = btc_eth_usdt();
        let id = tracker.upsert(&triangle, 5, observation(&triangle, 0.0005)).id();

        assert!(tracker.mark_scheduled(id));
        assert!(!tracker.mark_scheduled(id));
        assert!(!tracker.mark_scheduled(Uuid::new_v4()));
        assert_eq!(
            tracker.upsert(&triangle, 5, observation(&triangle, 0.0005)),
            Upsert::Refreshed { id, scheduled: true }
        );
    }

    #[test]
    fn test_concurrent_upserts_never_duplicate() {
        let tracker = Arc::new(OpportunityTracker::new(Duration::ZERO));
        let triangle = btc_eth_usdt();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                let triangle = triangle.clone();
                thread::spawn(move || {
                    (0..500)
                        .map(|i| tracker.upsert(&triangle, i % 4, observation(&triangle, 0.001)))
                        .filter(|outcome| matches!(outcome, Upsert::Created(_)))
                        .count()
                })
            })
            .collect();

        let created: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(created, 4);
        assert_eq!(tracker.len(), 4);
    }

    #[test]
    fn test_stale_reported_once_under_concurrent_upserts() {
        let tracker = Arc::new(OpportunityTracker::new(Duration::from_secs(60)));
        let triangle = btc_eth_usdt();
        let stale_id = tracker.upsert(&triangle, 100, observation(&triangle, 0.01)).id();
        let threshold = Duration::from_millis(20);

        let stop = Arc::new(AtomicBool::new(false));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let (tracker, triangle, stop) = (tracker.clone(), triangle.clone(), stop.clone());
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        tracker.upsert(&triangle, w, observation(&triangle, 0.0001));
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(40));

        let hits = Arc::new(AtomicUsize::new(0));
        let sweepers: Vec<_> = (0..4)
            .map(|_| {
                let (tracker, hits) = (tracker.clone(), hits.clone());
                thread::spawn(move || {
                    for _ in 0..50 {
                        tracker.sweep(
                            |o| o.last_update.elapsed() > threshold,
                            |o| {
                                if o.id == stale_id {
                                    hits.fetch_add(1, Ordering::SeqCst);
                                }
                            }
                        );
                    }
                })
            })
            .collect();

        for sweeper in sweepers {
            sweeper.join().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
