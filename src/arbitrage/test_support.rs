//! Builders and fakes shared by the arbitrage tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::sim_trader::{ simulate, FeeSchedule };
use super::tracker::Observation;
use crate::error::OrderError;
use crate::exchange::client::OrderGateway;
use crate::models::coin::CoinPair;
use crate::models::order::{ Fill, OrderRequest, OrderResult, OrderStatus };
use crate::models::ticker::Ticker;
use crate::models::triangle::Triangle;

pub fn pair(base: &str, quote: &str) -> Arc<CoinPair> {
    Arc::new(CoinPair::new(base, quote))
}

/// BTC -> USDT -> ETH -> BTC, oriented as the index builds it
pub fn btc_eth_usdt() -> Arc<Triangle> {
    let triangle = Triangle::from_pairs(
        &pair("BTC", "USDT"),
        &pair("ETH", "BTC"),
        &pair("ETH", "USDT")
    ).unwrap();
    Arc::new(triangle)
}

/// BTCUSDT 50000, ETHUSDT 3000/3001, ETHBTC 0.061/0.0611
pub fn scenario_a_book() -> HashMap<String, Ticker> {
    [
        ("BTCUSDT", Ticker::new(50000.0, 50000.0)),
        ("ETHUSDT", Ticker::new(3000.0, 3001.0)),
        ("ETHBTC", Ticker::new(0.061, 0.0611)),
    ]
        .into_iter()
        .map(|(symbol, ticker)| (symbol.to_string(), ticker))
        .collect()
}

/// Observation with the scenario A legs and an arbitrary profit figure
pub fn observation(triangle: &Triangle, profit: f64) -> Observation {
    let book = scenario_a_book();
    let fees = FeeSchedule::zero();
    let [(ab, a), (bc, b), (ac, c)] = triangle.legs();

    let first = simulate(1.0, ab, a, &book, &fees).unwrap();
    let second = simulate(first.qty_out, bc, b, &book, &fees).unwrap();
    let third = simulate(second.qty_out, ac, c, &book, &fees).unwrap();

    Observation {
        qty_before: 1.0,
        qty_after: 1.0 + profit,
        profit,
        legs: [first, second, third],
    }
}

/// Order gateway answering from a per-symbol script, FILLED by default
#[derive(Default)]
pub struct ScriptedGateway {
    failures: Mutex<HashMap<String, OrderError>>,
    latency: Duration,
    placed: Mutex<Vec<OrderRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail(self, symbol: &str, error: OrderError) -> Self {
        self.failures.lock().insert(symbol.to_string(), error);
        self
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn place(&self, request: &OrderRequest) -> Result<OrderResult, OrderError> {
        self.placed.lock().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.failures.lock().get(&request.symbol) {
            return Err(error.clone());
        }

        Ok(OrderResult {
            symbol: request.symbol.clone(),
            order_id: request.timestamp,
            client_order_id: request.client_order_id.clone(),
            transact_time: Utc::now(),
            price: request.price,
            orig_qty: request.quantity,
            executed_qty: request.quantity,
            cumulative_quote_qty: request.quantity * request.price,
            status: OrderStatus::Filled,
            time_in_force: request.time_in_force,
            order_type: request.order_type,
            side: request.side,
            fills: vec![Fill {
                price: request.price,
                qty: request.quantity,
                commission: 0.0,
                commission_asset: String::new(),
            }],
        })
    }
}
