// src/arbitrage/triangle_index.rs

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::{ info, warn };

use crate::models::coin::{ Coin, CoinPair };
use crate::models::triangle::Triangle;

/// Every triangle of the pair universe, one per canonical key. Frozen after `build`.
#[derive(Debug, Default)]
pub struct TriangleIndex {
    triangles: AHashMap<Arc<str>, Arc<Triangle>>,
    rejected: usize,
}

impl TriangleIndex {
    /// Build the index from a pair universe snapshot.
    ///
    /// The result equals walking every ordered triple of pairs and keeping the
    /// first triple per key that resolves into a triangle. Pairs are sorted by
    /// symbol first, so the index and each triangle's orientation do not depend
    /// on the input order. Only triples whose first two pairs share a coin are
    /// visited, which every three-coin triple satisfies.
    pub fn build(pairs: &[CoinPair]) -> Self {
        let start = Instant::now();

        let mut pairs: Vec<Arc<CoinPair>> = pairs
            .iter()
            .filter(|pair| pair.base != pair.quote)
            .cloned()
            .map(Arc::new)
            .collect();
        pairs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        pairs.dedup_by(|a, b| a.symbol == b.symbol);

        // coin -> pairs touching it, and unordered coin edge -> pairs serving it
        let mut by_coin: AHashMap<&Coin, Vec<usize>> = AHashMap::with_capacity(pairs.len());
        let mut by_edge: AHashMap<(&Coin, &Coin), Vec<usize>> = AHashMap::with_capacity(
            pairs.len()
        );
        for (idx, pair) in pairs.iter().enumerate() {
            by_coin.entry(&pair.base).or_default().push(idx);
            by_coin.entry(&pair.quote).or_default().push(idx);
            by_edge.entry(edge(&pair.base, &pair.quote)).or_default().push(idx);
        }

        let candidates: Vec<Vec<[usize; 3]>> = (0..pairs.len())
            .into_par_iter()
            .map(|first| triples_starting_at(first, &pairs, &by_coin, &by_edge))
            .collect();

        let mut triangles: AHashMap<Arc<str>, Arc<Triangle>> = AHashMap::new();
        let mut rejected = 0;

        for [i, j, k] in candidates.into_iter().flatten() {
            let Some(key) = Triangle::canonical_key([&pairs[i], &pairs[j], &pairs[k]]) else {
                continue;
            };
            if triangles.contains_key(key.as_str()) {
                continue;
            }

            match Triangle::from_pairs(&pairs[i], &pairs[j], &pairs[k]) {
                Ok(triangle) => {
                    triangles.insert(triangle.key.clone(), Arc::new(triangle));
                }
                Err(err) => {
                    rejected += 1;
                    warn!(error = %err, "Rejected triple while building triangle index");
                }
            }
        }

        info!(
            pairs = pairs.len(),
            triangles = triangles.len(),
            rejected,
            "Built triangle index in {:?}",
            start.elapsed()
        );

        Self { triangles, rejected }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Arc<Triangle>> {
        self.triangles.get(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Triples that spanned three coins but did not resolve
    #[inline]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn triangles(&self) -> impl Iterator<Item = &Arc<Triangle>> {
        self.triangles.values()
    }

    /// Triangles sorted by key, the scan order of the detector
    pub fn to_sorted_vec(&self) -> Vec<Arc<Triangle>> {
        let mut triangles: Vec<_> = self.triangles.values().cloned().collect();
        triangles.sort_by(|a, b| a.key.cmp(&b.key));
        triangles
    }

    /// Unique pair symbols used by at least one triangle
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.triangles
            .values()
            .flat_map(|triangle| triangle.symbols())
            .map(str::to_string)
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }
}

#[inline]
fn edge<'a>(a: &'a Coin, b: &'a Coin) -> (&'a Coin, &'a Coin) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Ordered triples `[first, j, k]` with three distinct coin edges, ascending in (j, k)
fn triples_starting_at(
    first: usize,
    pairs: &[Arc<CoinPair>],
    by_coin: &AHashMap<&Coin, Vec<usize>>,
    by_edge: &AHashMap<(&Coin, &Coin), Vec<usize>>
) -> Vec<[usize; 3]> {
    let pair = &pairs[first];
    let (a, b) = (&pair.base, &pair.quote);

    let mut neighbours: Vec<usize> = [a, b]
        .into_iter()
        .filter_map(|coin| by_coin.get(coin))
        .flatten()
        .copied()
        .filter(|&idx| idx != first)
        .collect();
    neighbours.sort_unstable();
    neighbours.dedup();

    let mut triples = Vec::new();
    for second in neighbours {
        let other = &pairs[second];
        // the coin `other` adds and the coin it shares with `pair`
        let (shared, c) = if other.base == *a || other.base == *b {
            (&other.base, &other.quote)
        } else {
            (&other.quote, &other.base)
        };
        if c == a || c == b {
            continue;
        }

        let unshared = if shared == a { b } else { a };
        if let Some(closing) = by_edge.get(&edge(unshared, c)) {
            triples.extend(closing.iter().map(|&third| [first, second, third]));
        }
    }

    triples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<CoinPair> {
        vec![
            CoinPair::new("BTC", "USDT"),
            CoinPair::new("ETH", "USDT"),
            CoinPair::new("ETH", "BTC"),
            CoinPair::new("BNB", "USDT"),
            CoinPair::new("BNB", "BTC"),
            CoinPair::new("BNB", "ETH"),
            CoinPair::new("XRP", "USDT")
        ]
    }

    #[test]
    fn test_one_triangle_per_coin_set() {
        let index = TriangleIndex::build(&universe());

        // {BTC,ETH,USDT} {BNB,BTC,USDT} {BNB,ETH,USDT} {BNB,BTC,ETH}
        assert_eq!(index.len(), 4);
        assert_eq!(index.rejected(), 0);
        for key in ["BTCETHUSDT", "BNBBTCUSDT", "BNBETHUSDT", "BNBBTCETH"] {
            assert!(index.get(key).is_some(), "missing {}", key);
        }
        assert!(!index.symbols().contains(&"XRPUSDT".to_string()));
    }

    #[test]
    fn test_independent_of_input_order() {
        let forward = TriangleIndex::build(&universe());

        let mut reversed = universe();
        reversed.reverse();
        let reversed = TriangleIndex::build(&reversed);

        let mut rotated = universe();
        rotated.rotate_left(3);
        let rotated = TriangleIndex::build(&rotated);

        for other in [&reversed, &rotated] {
            assert_eq!(other.len(), forward.len());
            for triangle in forward.triangles() {
                let twin = other.get(&triangle.key).unwrap();
                assert_eq!(twin.path(), triangle.path());
                assert_eq!(twin.symbols(), triangle.symbols());
            }
        }
    }

    #[test]
    fn test_matches_naive_triple_walk() {
        let mut pairs = universe();
        pairs.push(CoinPair::new("USDT", "BTC")); // second listing of the BTC/USDT edge
        let index = TriangleIndex::build(&pairs);

        pairs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let pairs: Vec<Arc<CoinPair>> = pairs.into_iter().map(Arc::new).collect();
        let mut naive: AHashMap<String, Triangle> = AHashMap::new();
        for i in &pairs {
            for j in &pairs {
                for k in &pairs {
                    let Some(key) = Triangle::canonical_key([i, j, k]) else {
                        continue;
                    };
                    if naive.contains_key(&key) {
                        continue;
                    }
                    if let Ok(triangle) = Triangle::from_pairs(i, j, k) {
                        naive.insert(key, triangle);
                    }
                }
            }
        }

        assert_eq!(index.len(), naive.len());
        for (key, triangle) in &naive {
            let built = index.get(key).unwrap();
            assert_eq!(built.symbols(), triangle.symbols());
            assert_eq!(built.path(), triangle.path());
        }
    }

    #[test]
    fn test_empty_universe() {
        let index = TriangleIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.symbols().is_empty());
    }
}
