// src/exchange/balances.rs

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

use ahash::AHashSet;
use dashmap::DashMap;
use tokio::time::{ Instant, MissedTickBehavior };
use tracing::{ debug, info, warn };

use super::client::ExchangeClient;
use crate::models::coin::Coin;
use crate::models::order::CoinBalance;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Last known free balance per coin
#[derive(Debug, Default)]
pub struct BalanceBook {
    balances: DashMap<Coin, f64>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, coin: impl Into<Coin>, free: f64) {
        self.balances.insert(coin.into(), free);
    }

    #[inline]
    pub fn free(&self, coin: &Coin) -> Option<f64> {
        self.balances.get(coin).map(|entry| *entry)
    }

    /// Balances of the given coins, `None` for coins never seen
    pub fn snapshot(&self, coins: &[Coin]) -> Vec<CoinBalance> {
        coins
            .iter()
            .map(|coin| CoinBalance {
                coin: coin.clone(),
                free: self.free(coin),
            })
            .collect()
    }

    /// Replace the book with a fresh account read. Coins present before and after
    /// are overwritten in place, so readers never see them missing.
    pub fn apply(&self, balances: Vec<(String, f64)>) {
        let mut seen = AHashSet::with_capacity(balances.len());
        for (asset, free) in balances {
            let coin = Coin::new(asset);
            self.balances.insert(coin.clone(), free);
            seen.insert(coin);
        }
        self.balances.retain(|coin, _| seen.contains(coin));
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Refresh from the account endpoint until shutdown. Failed reads keep the old values.
    pub async fn run_refresh(
        self: Arc<Self>,
        client: Arc<dyn ExchangeClient>,
        every: Duration,
        shutdown: Arc<AtomicBool>
    ) {
        let mut interval = tokio::time::interval(SHUTDOWN_POLL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "Balance refresh started");

        let mut last_refresh: Option<Instant> = None;
        while !shutdown.load(Ordering::Relaxed) {
            interval.tick().await;
            if last_refresh.is_some_and(|at| at.elapsed() < every) {
                continue;
            }
            last_refresh = Some(Instant::now());
            match client.get_balances().await {
                Ok(balances) => {
                    self.apply(balances);
                    debug!(coins = self.len(), "Balances refreshed");
                }
                Err(e) => warn!("Failed to refresh balances: {:#}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_marks_unknown_coins() {
        let book = BalanceBook::new();
        book.apply(vec![("BTC".to_string(), 0.5), ("USDT".to_string(), 1200.0)]);

        let snapshot = book.snapshot(&["BTC".into(), "ETH".into(), "USDT".into()]);
        assert_eq!(snapshot[0].free, Some(0.5));
        assert_eq!(snapshot[1].free, None);
        assert_eq!(snapshot[2].coin, Coin::from("USDT"));

        book.apply(vec![("ETH".to_string(), 2.0)]);
        assert_eq!(book.free(&"BTC".into()), None);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_refresh_never_hides_kept_coins() {
        let book = BalanceBook::new();
        book.apply(vec![("BTC".to_string(), 0.5), ("USDT".to_string(), 1200.0)]);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..2000 {
                    book.apply(vec![("BTC".to_string(), 0.5 + (i as f64)), ("USDT".to_string(), 1200.0)]);
                }
            });
            for _ in 0..2000 {
                assert!(book.free(&"BTC".into()).is_some());
                assert!(book.free(&"USDT".into()).is_some());
            }
        });
    }
}
