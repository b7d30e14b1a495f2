use std::sync::atomic::{ AtomicI64, Ordering };
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::{ info, warn };

use super::client::OrderGateway;
use crate::error::OrderError;
use crate::models::order::{ Fill, OrderRequest, OrderResult, OrderStatus };

/// Simulated order placement for paper trading
pub struct PaperGateway {
    simulated_latency: Duration,
    success_rate: f64, // 0.0 to 1.0
    next_order_id: AtomicI64,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self {
            simulated_latency: Duration::from_millis(20),
            success_rate: 0.95,
            next_order_id: AtomicI64::new(1),
        }
    }

    /// Set the simulated success rate (for testing different scenarios)
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the simulated latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = latency;
        self
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place(&self, request: &OrderRequest) -> Result<OrderResult, OrderError> {
        if !(request.quantity > 0.0) || !(request.price > 0.0) {
            return Err(OrderError::Invalid(format!("{} qty {} @ {}", request.symbol, request.quantity, request.price)));
        }

        // Simulate network latency
        tokio::time::sleep(self.simulated_latency).await;

        // Simulate random success/failure
        let success = rand::rng().random_bool(self.success_rate);
        if !success {
            warn!("Paper: order rejected for {}", request.symbol);
            return Err(OrderError::Rejected {
                code: -2010,
                message: "Paper execution failed - insufficient liquidity".to_string(),
            });
        }

        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "Paper: order filled - {} {} {} @ {:.8}",
            request.side,
            request.symbol,
            request.quantity,
            request.price
        );

        Ok(OrderResult {
            symbol: request.symbol.clone(),
            order_id,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{ OrderSide, OrderType, TimeInForce };

    fn request(quantity: f64) -> OrderRequest {
        OrderRequest {
            symbol: "ETHUSDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Ioc,
            quantity,
            price: 3001.0,
            client_order_id: "ETHUSDT_1".to_string(),
            timestamp: 1,
            test_mode: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_and_never_fill() {
        let filled = PaperGateway::new().with_success_rate(1.0).place(&request(0.5)).await.unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.cumulative_quote_qty, 1500.5);

        let rejected = PaperGateway::new().with_success_rate(0.0).place(&request(0.5)).await;
        assert!(matches!(rejected, Err(OrderError::Rejected { .. })));

        let invalid = PaperGateway::new().place(&request(0.0)).await;
        assert!(matches!(invalid, Err(OrderError::Invalid(_))));
    }
}
