use std::sync::Arc;
use std::time::Duration;

use chrono::{ DateTime, Utc };
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::coin::{ Coin, CoinPair };
use super::order::OrderSide;
use super::triangle::Triangle;

/// Outcome of simulating one conversion against the current book
#[derive(Debug, Clone, PartialEq)]
pub struct LegQuote {
    pub pair: Arc<CoinPair>,
    /// Coin given up on this leg
    pub from: Coin,
    pub side: OrderSide,
    pub price: f64,
    pub qty_in: f64,
    pub qty_out: f64,
    /// Order quantity in base units, before fees
    pub base_qty: f64,
    pub fee_rate: f64,
}

/// Composite identity of an opportunity: triangle and discretized profit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpportunityKey {
    pub triangle: Arc<str>,
    pub profit_bucket: i64,
}

/// One observed episode of a triangle being profitable
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub id: Uuid,
    pub triangle: Arc<Triangle>,
    pub profit_bucket: i64,
    pub qty_before: f64,
    pub qty_after: f64,
    pub profit_relative: f64,
    pub legs: [LegQuote; 3],
    pub started_at: DateTime<Utc>,
    pub start: Instant,
    pub last_update: Instant,
    pub reported: bool,
    pub reported_at: Option<Instant>,
    pub scheduled: bool,
}

impl Opportunity {
    /// Time between first and latest profitable observation
    #[inline]
    pub fn observed_for(&self) -> Duration {
        self.last_update.saturating_duration_since(self.start)
    }

    #[inline]
    pub fn profit_percentage(&self) -> f64 {
        self.profit_relative * 100.0
    }

    pub fn report(&self) -> OpportunityReport {
        let duration = self.observed_for();
        let last_update_at =
            self.started_at + chrono::Duration::from_std(duration).unwrap_or_default();

        OpportunityReport {
            id: self.id,
            triangle: self.triangle.key.to_string(),
            path: self.triangle.path(),
            symbols: self.triangle
                .symbols()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            coin: self.triangle.coin_a.clone(),
            qty_before: self.qty_before,
            qty_after: self.qty_after,
            profit_relative: self.profit_relative,
            profit_percentage: self.profit_percentage(),
            started_at: self.started_at,
            last_update_at,
            duration_ms: duration.as_secs_f64() * 1000.0,
            scheduled: self.scheduled,
        }
    }
}

/// Finalized opportunity record for the audit log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityReport {
    pub id: Uuid,
    pub triangle: String,
    pub path: String,
    pub symbols: Vec<String>,
    /// Coin the quantities are expressed in
    pub coin: Coin,
    pub qty_before: f64,
    pub qty_after: f64,
    pub profit_relative: f64,
    pub profit_percentage: f64,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub scheduled: bool,
}
