use anyhow::Result;
use async_trait::async_trait;

use crate::error::OrderError;
use crate::models::coin::CoinPair;
use crate::models::order::{ OrderRequest, OrderResult };
use crate::models::ticker::Ticker;

/// Market metadata and account reads common to all exchanges
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Get the name of the exchange
    fn name(&self) -> &str;

    /// Pairs currently open for spot trading
    async fn get_trading_pairs(&self) -> Result<Vec<CoinPair>>;

    /// Current best bid / ask of every symbol
    async fn get_book_tickers(&self) -> Result<Vec<(String, Ticker)>>;

    /// Free balance per coin
    async fn get_balances(&self) -> Result<Vec<(String, f64)>>;

    /// Check if the exchange is operational
    async fn is_operational(&self) -> Result<bool>;
}

/// Places a single order
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place(&self, request: &OrderRequest) -> Result<OrderResult, OrderError>;
}
