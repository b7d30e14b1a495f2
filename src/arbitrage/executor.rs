// src/arbitrage/executor.rs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicI64, AtomicU64, Ordering };
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::{ JoinHandle, JoinSet };
use tracing::{ debug, error, info, warn };
use uuid::Uuid;

use super::admission::{ AdmissionControl, Reservation };
use super::tracker::OpportunityTracker;
use crate::error::OrderError;
use crate::exchange::balances::BalanceBook;
use crate::exchange::client::OrderGateway;
use crate::models::coin::Coin;
use crate::models::opportunity::Opportunity;
use crate::models::triangle::Triangle;
use crate::models::order::{
    CoinBalance,
    OrderRequest,
    OrderResult,
    OrderSide,
    OrderStatusEvent,
    OrderType,
    TimeInForce,
};
use crate::monitor::journal::EventSink;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Longest wait on an idle queue before the shutdown flag is checked again
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

static NONCE_CLOCK: NonceClock = NonceClock::new();

/// Strictly increasing millisecond clock for order ids and timestamps
#[derive(Debug)]
pub struct NonceClock {
    last: AtomicI64,
}

impl NonceClock {
    pub const fn new() -> Self {
        Self { last: AtomicI64::new(0) }
    }

    /// Wall clock millis, bumped past the previous value when the clock has not moved
    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => {
                    return next;
                }
                Err(actual) => {
                    last = actual;
                }
            }
        }
    }
}

/// Decides whether a profitable triangle is worth executing
pub trait EligibilityPolicy: Send + Sync {
    fn is_eligible(&self, triangle: &Triangle, profit: f64) -> bool;
}

/// Requires a minimum profit and the trade asset among the triangle's coins
#[derive(Debug, Clone)]
pub struct MinProfitPolicy {
    pub min_profit: f64,
    pub trade_asset: Coin,
}

impl EligibilityPolicy for MinProfitPolicy {
    fn is_eligible(&self, triangle: &Triangle, profit: f64) -> bool {
        profit >= self.min_profit && triangle.coins().contains(&self.trade_asset)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Coin the notional is expressed in
    pub trade_asset: Coin,
    pub trade_amount: f64,
    pub settlement_delay: Duration,
    pub order_timeout: Duration,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct LegPlan {
    symbol: String,
    side: OrderSide,
    quantity: f64,
    price: f64,
}

/// How one leg ended
#[derive(Debug)]
pub struct LegOutcome {
    /// Position in the cycle, 0 to 2
    pub leg: usize,
    pub symbol: String,
    pub client_order_id: String,
    pub result: Result<OrderResult, OrderError>,
}

#[derive(Debug)]
pub struct ExecutionReport {
    pub opportunity_id: Uuid,
    pub path: String,
    /// Sorted by leg
    pub legs: Vec<LegOutcome>,
}

impl ExecutionReport {
    pub fn failed_legs(&self) -> usize {
        self.legs
            .iter()
            .filter(|leg| leg.result.is_err())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.legs.len() == 3 && self.failed_legs() == 0
    }
}

/// Result of offering an opportunity for execution
#[derive(Debug)]
pub enum Admission {
    AlreadyScheduled,
    Ineligible,
    /// One of the coins is in use by another execution
    Denied,
    Dispatched(JoinHandle<ExecutionReport>),
}

#[derive(Debug, Default)]
struct ExecutionStats {
    dispatched: AtomicU64,
    ineligible: AtomicU64,
    denied: AtomicU64,
    lost_race: AtomicU64,
    legs_ok: AtomicU64,
    legs_failed: AtomicU64,
}

/// Point-in-time copy of the execution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionCounters {
    pub dispatched: u64,
    pub ineligible: u64,
    pub denied: u64,
    pub lost_race: u64,
    pub legs_ok: u64,
    pub legs_failed: u64,
}

impl fmt::Display for ExecutionCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dispatched={} ineligible={} denied={} lost_race={} legs_ok={} legs_failed={}",
            self.dispatched,
            self.ineligible,
            self.denied,
            self.lost_race,
            self.legs_ok,
            self.legs_failed
        )
    }
}

/// Everything a leg task needs, shared by all legs of all executions
struct LegContext {
    gateway: Arc<dyn OrderGateway>,
    events: Arc<dyn EventSink>,
    balances: Option<Arc<BalanceBook>>,
    settings: ExecutionSettings,
    stats: Arc<ExecutionStats>,
}

impl LegContext {
    fn balances(&self, coins: &[Coin]) -> Vec<CoinBalance> {
        match &self.balances {
            Some(book) => book.snapshot(coins),
            None => Vec::new(),
        }
    }

    fn request(&self, plan: LegPlan) -> OrderRequest {
        let nonce = NONCE_CLOCK.next();
        OrderRequest {
            client_order_id: format!("{}_{}", plan.symbol, nonce),
            symbol: plan.symbol,
            side: plan.side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Ioc,
            quantity: plan.quantity,
            price: plan.price,
            timestamp: nonce,
            test_mode: self.settings.test_mode,
        }
    }
}

/// Gates opportunities through admission control and fires their three legs
pub struct ExecutionCoordinator {
    tracker: Arc<OpportunityTracker>,
    admission: Arc<AdmissionControl>,
    policy: Arc<dyn EligibilityPolicy>,
    ctx: Arc<LegContext>,
}

impl ExecutionCoordinator {
    pub fn new(
        tracker: Arc<OpportunityTracker>,
        admission: Arc<AdmissionControl>,
        gateway: Arc<dyn OrderGateway>,
        events: Arc<dyn EventSink>,
        policy: Arc<dyn EligibilityPolicy>,
        settings: ExecutionSettings,
        balances: Option<Arc<BalanceBook>>
    ) -> Self {
        Self {
            tracker,
            admission,
            policy,
            ctx: Arc::new(LegContext {
                gateway,
                events,
                balances,
                settings,
                stats: Arc::new(ExecutionStats::default()),
            }),
        }
    }

    /// Admit an opportunity and, when granted, launch its legs.
    ///
    /// The returned handle resolves once all legs completed and the coins were
    /// released. Dropping it does not cancel anything.
    pub fn admit_and_execute(&self, opportunity: &Opportunity) -> Admission {
        let stats = &self.ctx.stats;
        if opportunity.scheduled {
            return Admission::AlreadyScheduled;
        }
        if !self.policy.is_eligible(&opportunity.triangle, opportunity.profit_relative) {
            stats.ineligible.fetch_add(1, Ordering::Relaxed);
            return Admission::Ineligible;
        }
        let Some(plans) = self.plan_legs(opportunity) else {
            stats.ineligible.fetch_add(1, Ordering::Relaxed);
            return Admission::Ineligible;
        };

        let Some(reservation) = self.admission.try_acquire(opportunity.triangle.coins()) else {
            stats.denied.fetch_add(1, Ordering::Relaxed);
            debug!(id = %opportunity.id, "Admission denied, coins in use");
            return Admission::Denied;
        };

        if !self.tracker.mark_scheduled(opportunity.id) {
            stats.lost_race.fetch_add(1, Ordering::Relaxed);
            drop(reservation);
            return Admission::AlreadyScheduled;
        }

        stats.dispatched.fetch_add(1, Ordering::Relaxed);
        let path = opportunity.triangle.path();
        info!(
            id = %opportunity.id,
            profit = opportunity.profit_relative,
            test_mode = self.ctx.settings.test_mode,
            "Executing {}",
            path.bright_yellow()
        );

        Admission::Dispatched(
            tokio::spawn(supervise(self.ctx.clone(), opportunity.id, path, plans, reservation))
        )
    }

    /// Orders for the three legs, scaled so the trade asset leg spends the trade amount.
    ///
    /// Prices are the ones simulated when the opportunity was first seen. Refreshes
    /// only land in the same profit bucket, and IOC limits at those prices cannot
    /// fill worse than the opportunity promised.
    fn plan_legs(&self, opportunity: &Opportunity) -> Option<[LegPlan; 3]> {
        let settings = &self.ctx.settings;
        let funding = opportunity.legs
            .iter()
            .find(|leg| leg.from == settings.trade_asset)?;
        let scale = settings.trade_amount / funding.qty_in;
        if !scale.is_finite() || scale <= 0.0 {
            return None;
        }

        let mut plans = Vec::with_capacity(3);
        for leg in &opportunity.legs {
            let pair = &leg.pair;
            let quantity = pair.floor_qty(leg.base_qty * scale);
            if quantity <= 0.0 || pair.min_qty.is_some_and(|min| quantity < min) {
                debug!(
                    id = %opportunity.id,
                    symbol = %pair.symbol,
                    quantity,
                    "Leg quantity below exchange minimum"
                );
                return None;
            }
            plans.push(LegPlan {
                symbol: pair.symbol.to_string(),
                side: leg.side,
                quantity,
                price: pair.round_price(leg.price),
            });
        }
        plans.try_into().ok()
    }

    /// Consume opportunity ids until the channel closes or shutdown is flagged,
    /// then wait for every execution still in flight.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Uuid>, shutdown: Arc<AtomicBool>) {
        info!("Execution coordinator started");
        let mut executions: Vec<JoinHandle<ExecutionReport>> = Vec::new();

        while !shutdown.load(Ordering::Relaxed) {
            let id = match tokio::time::timeout(SHUTDOWN_POLL, rx.recv()).await {
                Err(_) => {
                    continue;
                }
                Ok(None) => {
                    break;
                }
                Ok(Some(id)) => id,
            };

            executions.retain(|handle| !handle.is_finished());
            let Some(opportunity) = self.tracker.get(id) else {
                continue;
            };
            if let Admission::Dispatched(handle) = self.admit_and_execute(&opportunity) {
                executions.push(handle);
            }
        }
        rx.close();

        // legs already sent still get their post-trade events
        let pending = executions
            .iter()
            .filter(|handle| !handle.is_finished())
            .count();
        if pending > 0 {
            info!(pending, "Waiting for in-flight executions");
        }
        for handle in executions {
            if let Err(e) = handle.await {
                error!("Execution task failed: {}", e);
            }
        }
        info!("Execution coordinator stopped");
    }

    pub fn counters(&self) -> ExecutionCounters {
        let stats = &self.ctx.stats;
        ExecutionCounters {
            dispatched: stats.dispatched.load(Ordering::Relaxed),
            ineligible: stats.ineligible.load(Ordering::Relaxed),
            denied: stats.denied.load(Ordering::Relaxed),
            lost_race: stats.lost_race.load(Ordering::Relaxed),
            legs_ok: stats.legs_ok.load(Ordering::Relaxed),
            legs_failed: stats.legs_failed.load(Ordering::Relaxed),
        }
    }

    /// Log the counters every minute, checking for shutdown in between
    pub async fn run_stats_task(self: Arc<Self>, shutdown: Arc<AtomicBool>) {
        let mut interval = tokio::time::interval(SHUTDOWN_POLL);
        let mut last_report = tokio::time::Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            interval.tick().await;
            if last_report.elapsed() < STATS_INTERVAL {
                continue;
            }
            last_report = tokio::time::Instant::now();
            info!("Execution stats: {} reserved_coins={}", self.counters(), self.admission.len());
        }
    }
}

/// Join the three legs, then give the coins back
async fn supervise(
    ctx: Arc<LegContext>,
    opportunity_id: Uuid,
    path: String,
    plans: [LegPlan; 3],
    reservation: Reservation
) -> ExecutionReport {
    let coins = reservation.coins().clone();
    let mut tasks = JoinSet::new();
    for (leg, plan) in plans.into_iter().enumerate() {
        let request = ctx.request(plan);
        tasks.spawn(run_leg(ctx.clone(), opportunity_id, leg, request, coins.clone()));
    }

    let mut legs = Vec::with_capacity(3);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => legs.push(outcome),
            Err(e) => error!(id = %opportunity_id, "Leg task failed: {}", e),
        }
    }
    drop(reservation);
    legs.sort_by_key(|outcome| outcome.leg);

    let report = ExecutionReport {
        opportunity_id,
        path,
        legs,
    };
    if report.is_complete() {
        info!(id = %opportunity_id, "Execution of {} complete", report.path.green());
    } else {
        warn!(
            id = %opportunity_id,
            failed = report.failed_legs(),
            finished = report.legs.len(),
            "Execution of {} incomplete",
            report.path.red()
        );
    }
    report
}

async fn run_leg(
    ctx: Arc<LegContext>,
    opportunity_id: Uuid,
    leg: usize,
    request: OrderRequest,
    coins: [Coin; 3]
) -> LegOutcome {
    ctx.events.emit(OrderStatusEvent::new_order(opportunity_id, &request, ctx.balances(&coins)));

    let result = match
        tokio::time::timeout(ctx.settings.order_timeout, ctx.gateway.place(&request)).await
    {
        Ok(result) => result,
        Err(_) => Err(OrderError::Timeout),
    };

    tokio::time::sleep(ctx.settings.settlement_delay).await;

    let balances = ctx.balances(&coins);
    match &result {
        Ok(order) => {
            ctx.stats.legs_ok.fetch_add(1, Ordering::Relaxed);
            info!(
                id = %opportunity_id,
                client_order_id = %order.client_order_id,
                status = %order.status,
                executed_qty = order.executed_qty,
                "Leg {} {} {}",
                leg,
                order.side,
                order.symbol
            );
            ctx.events.emit(OrderStatusEvent::from_result(opportunity_id, order, balances));
        }
        Err(e) => {
            ctx.stats.legs_failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                id = %opportunity_id,
                client_order_id = %request.client_order_id,
                "Leg {} {} {} failed: {}",
                leg,
                request.side,
                request.symbol,
                e
            );
            ctx.events.emit(
                OrderStatusEvent::from_error(opportunity_id, &request, e.to_string(), balances)
            );
        }
    }

    LegOutcome {
        leg,
        symbol: request.symbol,
        client_order_id: request.client_order_id,
        result,
    }
}
