use std::sync::Arc;

use serde::Serialize;

use crate::error::SimError;
use crate::models::coin::{ Coin, CoinPair };
use crate::models::opportunity::LegQuote;
use crate::models::order::OrderSide;
use crate::models::ticker::MarketSnapshot;

pub const DEFAULT_FEE: f64 = 0.001;
pub const DISCOUNTED_FEE: f64 = 0.00075;

/// Two-tier taker fee: discounted when the pair involves the fee coin
#[derive(Debug, Clone, Serialize)]
pub struct FeeSchedule {
    pub standard: f64,
    pub discounted: f64,
    pub discount_coin: Coin,
}

impl FeeSchedule {
    pub fn new(standard: f64, discounted: f64, discount_coin: impl Into<Coin>) -> Self {
        Self {
            standard,
            discounted,
            discount_coin: discount_coin.into(),
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, "BNB")
    }

    #[inline]
    pub fn rate_for(&self, pair: &CoinPair) -> f64 {
        if pair.involves(&self.discount_coin) { self.discounted } else { self.standard }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_FEE, DISCOUNTED_FEE, "BNB")
    }
}

/// Simulate converting `qty_in` of `from` through `pair` at top of book.
///
/// When `from` is the quote (the symbol ends with it) the base is bought at
/// the ask, otherwise `from` is the base and is sold at the bid. The fee is
/// taken from the output.
pub fn simulate<S>(
    qty_in: f64,
    pair: &Arc<CoinPair>,
    from: &Coin,
    snapshot: &S,
    fees: &FeeSchedule
) -> Result<LegQuote, SimError>
    where S: MarketSnapshot + ?Sized
{
    if !qty_in.is_finite() || qty_in <= 0.0 {
        return Err(SimError::InvalidQuantity(qty_in));
    }

    let ticker = snapshot
        .ticker(&pair.symbol)
        .ok_or_else(|| SimError::MissingMarketData(pair.symbol.to_string()))?;

    let (side, price) = if pair.is_quoted_in(from) {
        (OrderSide::Buy, ticker.ask_price)
    } else {
        (OrderSide::Sell, ticker.bid_price)
    };
    if !price.is_finite() || price <= 0.0 {
        return Err(SimError::MissingMarketData(pair.symbol.to_string()));
    }

    let fee_rate = fees.rate_for(pair);
    let (gross, base_qty) = match side {
        OrderSide::Buy => (qty_in / price, qty_in / price),
        OrderSide::Sell => (qty_in * price, qty_in),
    };

    Ok(LegQuote {
        pair: Arc::clone(pair),
        from: from.clone(),
        side,
        price,
        qty_in,
        qty_out: gross * (1.0 - fee_rate),
        base_qty,
        fee_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticker::Ticker;
    use std::collections::HashMap;

    fn book(entries: &[(&str, f64, f64)]) -> HashMap<String, Ticker> {
        entries
            .iter()
            .map(|(symbol, bid, ask)| (symbol.to_string(), Ticker::new(*bid, *ask)))
            .collect()
    }

    #[test]
    fn test_sell_base_at_bid() {
        let pair = Arc::new(CoinPair::new("BTC", "USDT"));
        let snapshot = book(&[("BTCUSDT", 50000.0, 50010.0)]);

        let leg = simulate(2.0, &pair, &"BTC".into(), &snapshot, &FeeSchedule::zero()).unwrap();
        assert_eq!(leg.side, OrderSide::Sell);
        assert_eq!(leg.price, 50000.0);
        assert_eq!(leg.qty_out, 100000.0);
        assert_eq!(leg.base_qty, 2.0);
    }

    #[test]
    fn test_buy_base_at_ask_with_fee() {
        let pair = Arc::new(CoinPair::new("ETH", "USDT"));
        let snapshot = book(&[("ETHUSDT", 3000.0, 3001.0)]);

        let leg = simulate(3001.0, &pair, &"USDT".into(), &snapshot, &FeeSchedule::default()).unwrap();
        assert_eq!(leg.side, OrderSide::Buy);
        assert_eq!(leg.base_qty, 1.0);
        assert!((leg.qty_out - 0.999).abs() < 1e-12);
    }

    #[test]
    fn test_discounted_fee_for_fee_coin_pairs() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.rate_for(&CoinPair::new("BNB", "USDT")), DISCOUNTED_FEE);
        assert_eq!(fees.rate_for(&CoinPair::new("ETH", "BNB")), DISCOUNTED_FEE);
        assert_eq!(fees.rate_for(&CoinPair::new("ETH", "BTC")), DEFAULT_FEE);
    }

    #[test]
    fn test_reciprocal_legs_round_trip() {
        let pair = Arc::new(CoinPair::new("ETH", "BTC"));
        let snapshot = book(&[("ETHBTC", 0.0613, 0.0613)]);
        let fees = FeeSchedule::zero();

        for qty in [1.0, 0.37, 1234.5678] {
            let there = simulate(qty, &pair, &"ETH".into(), &snapshot, &fees).unwrap();
            let back = simulate(there.qty_out, &pair, &"BTC".into(), &snapshot, &fees).unwrap();
            assert!((back.qty_out - qty).abs() <= qty * 1e-12, "{} -> {}", qty, back.qty_out);
        }
    }

    #[test]
    fn test_unavailable_without_price() {
        let pair = Arc::new(CoinPair::new("ETH", "BTC"));
        let fees = FeeSchedule::zero();

        let missing = simulate(1.0, &pair, &"ETH".into(), &book(&[]), &fees);
        assert_eq!(missing, Err(SimError::MissingMarketData("ETHBTC".to_string())));

        let no_ask = simulate(1.0, &pair, &"BTC".into(), &book(&[("ETHBTC", 0.06, 0.0)]), &fees);
        assert!(matches!(no_ask, Err(SimError::MissingMarketData(_))));

        let bad_qty = simulate(0.0, &pair, &"ETH".into(), &book(&[("ETHBTC", 0.06, 0.07)]), &fees);
        assert_eq!(bad_qty, Err(SimError::InvalidQuantity(0.0)));
    }
}
