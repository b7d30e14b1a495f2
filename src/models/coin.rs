use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Currency symbol such as `BTC` or `USDT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Coin(Arc<str>); // Arc<str> keeps clones cheap across triangles

impl Coin {
    #[inline]
    pub fn new(symbol: impl Into<Arc<str>>) -> Self {
        Self(symbol.into())
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Coin {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

impl Borrow<str> for Coin {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Coin {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tradable market: `base` priced in `quote`, listed as `symbol`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinPair {
    pub symbol: Arc<str>,
    pub base: Coin,
    pub quote: Coin,
    pub price_precision: u8,
    pub qty_precision: u8,
    pub min_qty: Option<f64>,
}

impl CoinPair {
    /// Pair with the exchange's canonical `BASEQUOTE` symbol and default precision
    pub fn new(base: impl Into<Coin>, quote: impl Into<Coin>) -> Self {
        let base = base.into();
        let quote = quote.into();
        let symbol: Arc<str> = format!("{}{}", base, quote).into();

        Self {
            symbol,
            base,
            quote,
            price_precision: 8,
            qty_precision: 8,
            min_qty: None,
        }
    }

    pub fn with_precision(mut self, price_precision: u8, qty_precision: u8) -> Self {
        self.price_precision = price_precision;
        self.qty_precision = qty_precision;
        self
    }

    pub fn with_min_qty(mut self, min_qty: f64) -> Self {
        self.min_qty = Some(min_qty);
        self
    }

    /// Round a quantity down to the lot step
    #[inline]
    pub fn floor_qty(&self, qty: f64) -> f64 {
        let factor = (10f64).powi(self.qty_precision as i32);
        // nudge so 0.29 * 100 does not floor to 28
        ((qty * factor + 1e-9).floor() / factor).max(0.0)
    }

    #[inline]
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = (10f64).powi(self.price_precision as i32);
        (price * factor).round() / factor
    }

    #[inline]
    pub fn involves(&self, coin: &Coin) -> bool {
        &self.base == coin || &self.quote == coin
    }

    /// True when the symbol ends with `coin`, i.e. `coin` is what prices are quoted in
    #[inline]
    pub fn is_quoted_in(&self, coin: &Coin) -> bool {
        self.symbol.ends_with(coin.symbol())
    }

    /// Symbol match against both concatenation orders of the two coins
    #[inline]
    pub fn connects(&self, a: &Coin, b: &Coin) -> bool {
        let symbol = self.symbol.as_ref();
        let (a, b) = (a.symbol(), b.symbol());
        symbol.len() == a.len() + b.len() &&
            ((symbol.starts_with(a) && symbol.ends_with(b)) ||
                (symbol.starts_with(b) && symbol.ends_with(a)))
    }
}

impl fmt::Display for CoinPair {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
