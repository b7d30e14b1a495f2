// src/arbitrage/admission.rs

use std::sync::Arc;

use ahash::AHashSet;
use parking_lot::Mutex;
use tracing::debug;

use crate::models::coin::Coin;

/// Coins currently committed to an in-flight execution
#[derive(Debug, Default)]
pub struct AdmissionControl {
    reserved: Mutex<AHashSet<Coin>>,
}

impl AdmissionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve all three coins, or none when any of them is already taken
    pub fn try_reserve(&self, coins: &[Coin; 3]) -> bool {
        let mut reserved = self.reserved.lock();
        if coins.iter().any(|coin| reserved.contains(coin)) {
            return false;
        }
        reserved.extend(coins.iter().cloned());
        true
    }

    /// Releasing coins that are not reserved is a no-op
    pub fn release(&self, coins: &[Coin; 3]) {
        let mut reserved = self.reserved.lock();
        for coin in coins {
            reserved.remove(coin);
        }
    }

    /// `try_reserve` returning a guard that releases on drop
    pub fn try_acquire(self: &Arc<Self>, coins: [Coin; 3]) -> Option<Reservation> {
        if !self.try_reserve(&coins) {
            return None;
        }
        debug!(coins = ?coins, "Reserved coins");
        Some(Reservation {
            control: Arc::clone(self),
            coins,
        })
    }

    /// Number of reserved coins
    pub fn len(&self) -> usize {
        self.reserved.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held for the lifetime of one execution
#[derive(Debug)]
pub struct Reservation {
    control: Arc<AdmissionControl>,
    coins: [Coin; 3],
}

impl Reservation {
    pub fn coins(&self) -> &[Coin; 3] {
        &self.coins
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.control.release(&self.coins);
        debug!(coins = ?self.coins, "Released coins");
    }
}
