use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

/// Best bid / ask of one pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticker {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
}

impl Ticker {
    pub fn new(bid_price: f64, ask_price: f64) -> Self {
        Self {
            bid_price,
            bid_qty: 0.0,
            ask_price,
            ask_qty: 0.0,
        }
    }
}

/// Read-only view of current prices; a missing symbol means no price right now
pub trait MarketSnapshot: Send + Sync {
    fn ticker(&self, symbol: &str) -> Option<Ticker>;
}

impl MarketSnapshot for HashMap<String, Ticker> {
    #[inline]
    fn ticker(&self, symbol: &str) -> Option<Ticker> {
        self.get(symbol).copied()
    }
}

/// Live top-of-book store written by the market data feed
#[derive(Debug, Default)]
pub struct TickerBook {
    tickers: DashMap<Arc<str>, Ticker>,
}

impl TickerBook {
    pub fn new() -> Self {
        Self {
            tickers: DashMap::with_capacity(2048),
        }
    }

    #[inline]
    pub fn update(&self, symbol: &str, ticker: Ticker) {
        if let Some(mut entry) = self.tickers.get_mut(symbol) {
            *entry = ticker;
            return;
        }
        self.tickers.insert(symbol.into(), ticker);
    }

    #[inline]
    pub fn remove(&self, symbol: &str) {
        self.tickers.remove(symbol);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

impl MarketSnapshot for TickerBook {
    #[inline]
    fn ticker(&self, symbol: &str) -> Option<Ticker> {
        self.tickers.get(symbol).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_overwrites_and_misses() {
        let book = TickerBook::new();
        assert!(book.ticker("BTCUSDT").is_none());

        book.update("BTCUSDT", Ticker::new(50000.0, 50001.0));
        book.update("BTCUSDT", Ticker::new(50002.0, 50003.0));

        assert_eq!(book.len(), 1);
        assert_eq!(book.ticker("BTCUSDT").map(|t| t.bid_price), Some(50002.0));

        book.remove("BTCUSDT");
        assert!(book.is_empty());
    }
}
