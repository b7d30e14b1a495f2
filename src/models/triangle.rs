use std::collections::BTreeSet;
use std::sync::Arc;

use super::coin::{ Coin, CoinPair };
use crate::error::ArbError;

/// Three pairs closing a cycle A -> B -> C -> A over three distinct coins
#[derive(Clone, Debug)]
pub struct Triangle {
    /// Sorted coin symbols concatenated, identical for every permutation of the pairs
    pub key: Arc<str>,
    pub coin_a: Coin,
    pub coin_b: Coin,
    pub coin_c: Coin,
    pub pair_ab: Arc<CoinPair>,
    pub pair_bc: Arc<CoinPair>,
    pub pair_ac: Arc<CoinPair>,
}

impl Triangle {
    /// Canonical key of a triple, `None` unless the pairs are distinct and span exactly three coins
    pub fn canonical_key(pairs: [&CoinPair; 3]) -> Option<String> {
        let [first, second, third] = pairs;
        if
            first.symbol == second.symbol ||
            first.symbol == third.symbol ||
            second.symbol == third.symbol
        {
            return None;
        }

        let coins = coin_set(pairs);
        if coins.len() != 3 {
            return None;
        }

        Some(coins.into_iter().map(Coin::symbol).collect())
    }

    /// Resolve which pair links which coins.
    ///
    /// A and B are the base and quote of `first`, C is the remaining coin. Every
    /// edge must be served by one of the three pairs, otherwise the triple is rejected.
    pub fn from_pairs(
        first: &Arc<CoinPair>,
        second: &Arc<CoinPair>,
        third: &Arc<CoinPair>
    ) -> Result<Self, ArbError> {
        let key = Self::canonical_key([first, second, third]).ok_or_else(|| {
            ArbError::InvalidTriple(
                format!("{} {} {}", first.symbol, second.symbol, third.symbol)
            )
        })?;

        let coin_a = first.base.clone();
        let coin_b = first.quote.clone();
        let coin_c = coin_set([first, second, third])
            .into_iter()
            .find(|coin| **coin != coin_a && **coin != coin_b)
            .cloned()
            .ok_or_else(|| ArbError::InvalidTriple(key.clone()))?;

        let triple = [first, second, third];
        let find = |from: &Coin, to: &Coin| -> Result<Arc<CoinPair>, ArbError> {
            triple
                .iter()
                .find(|pair| pair.connects(from, to))
                .map(|pair| Arc::clone(pair))
                .ok_or_else(|| ArbError::TriangleResolution {
                    key: key.clone(),
                    from: from.to_string(),
                    to: to.to_string(),
                })
        };

        let pair_ab = find(&coin_a, &coin_b)?;
        let pair_bc = find(&coin_b, &coin_c)?;
        let pair_ac = find(&coin_a, &coin_c)?;

        Ok(Self {
            key: key.into(),
            coin_a,
            coin_b,
            coin_c,
            pair_ab,
            pair_bc,
            pair_ac,
        })
    }

    #[inline]
    pub fn coins(&self) -> [Coin; 3] {
        [self.coin_a.clone(), self.coin_b.clone(), self.coin_c.clone()]
    }

    /// Legs in trading order as (pair, coin being sold)
    #[inline]
    pub fn legs(&self) -> [(&Arc<CoinPair>, &Coin); 3] {
        [
            (&self.pair_ab, &self.coin_a),
            (&self.pair_bc, &self.coin_b),
            (&self.pair_ac, &self.coin_c),
        ]
    }

    #[inline]
    pub fn symbols(&self) -> [&str; 3] {
        [&self.pair_ab.symbol, &self.pair_bc.symbol, &self.pair_ac.symbol]
    }

    /// Human readable cycle, e.g. `BTC->USDT->ETH->BTC`
    pub fn path(&self) -> String {
        format!("{}->{}->{}->{}", self.coin_a, self.coin_b, self.coin_c, self.coin_a)
    }
}

fn coin_set(pairs: [&CoinPair; 3]) -> BTreeSet<&Coin> {
    pairs
        .into_iter()
        .flat_map(|pair| [&pair.base, &pair.quote])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(base: &str, quote: &str) -> Arc<CoinPair> {
        Arc::new(CoinPair::new(base, quote))
    }

    #[test]
    fn test_resolves_edges_from_first_pair() {
        let triangle = Triangle::from_pairs(
            &pair("BTC", "USDT"),
            &pair("ETH", "USDT"),
            &pair("ETH", "BTC")
        ).unwrap();

        assert_eq!(triangle.key.as_ref(), "BTCETHUSDT");
        assert_eq!(triangle.coin_a.symbol(), "BTC");
        assert_eq!(triangle.coin_b.symbol(), "USDT");
        assert_eq!(triangle.coin_c.symbol(), "ETH");
        assert_eq!(triangle.symbols(), ["BTCUSDT", "ETHUSDT", "ETHBTC"]);
        assert_eq!(triangle.path(), "BTC->USDT->ETH->BTC");
    }

    #[test]
    fn test_rejects_non_triangles() {
        let btc_usdt = pair("BTC", "USDT");
        assert!(Triangle::canonical_key([&btc_usdt, &btc_usdt, &pair("ETH", "BTC")]).is_none());
        assert!(
            Triangle::canonical_key([&btc_usdt, &pair("ETH", "USDT"), &pair("XRP", "BTC")]).is_none()
        );
    }

    #[test]
    fn test_missing_edge_is_reported() {
        // two listings of the same coin pair leave ETH/USDT unserved
        let err = Triangle::from_pairs(
            &pair("BTC", "USDT"),
            &pair("USDT", "BTC"),
            &pair("ETH", "BTC")
        ).unwrap_err();

        assert_eq!(err, ArbError::TriangleResolution {
            key: "BTCETHUSDT".to_string(),
            from: "USDT".to_string(),
            to: "ETH".to_string(),
        });
    }
}
