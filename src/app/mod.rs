pub mod index_mode;
pub mod normal_mode;

use std::sync::Arc;

use anyhow::{ anyhow, Context, Result };
use tracing::{ error, info };

use crate::arbitrage::triangle_index::TriangleIndex;
use crate::error::ArbError;
use crate::exchange::client::ExchangeClient;
use crate::models::coin::CoinPair;
use crate::API_TIMEOUT;

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder
        ::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")
}

/// Check connectivity, then load the pair universe and build the triangle index
pub(crate) async fn load_index(
    client: &Arc<dyn ExchangeClient>,
    excluded_coins: &[String]
) -> Result<TriangleIndex> {
    match tokio::time::timeout(API_TIMEOUT, client.is_operational()).await {
        Ok(Ok(true)) => info!("✓ {} is operational", client.name()),
        _ => {
            error!("❌ Exchange is not operational or timed out");
            return Err(anyhow!(ArbError::Startup(format!("{} is not operational", client.name()))));
        }
    }

    let pairs = tokio::time
        ::timeout(API_TIMEOUT, client.get_trading_pairs()).await
        .map_err(|_| ArbError::Startup("timed out while fetching trading pairs".into()))?
        .context("Failed to fetch trading pairs")?;
    info!("✓ Fetched {} trading pairs from exchange", pairs.len());

    let pairs = without_excluded(pairs, excluded_coins);
    let index = TriangleIndex::build(&pairs);
    if index.is_empty() {
        return Err(anyhow!(ArbError::Startup("no triangles in the pair universe".into())));
    }
    Ok(index)
}

fn without_excluded(pairs: Vec<CoinPair>, excluded_coins: &[String]) -> Vec<CoinPair> {
    pairs
        .into_iter()
        .filter(|pair| {
            !excluded_coins
                .iter()
                .any(|coin| coin == pair.base.symbol() || coin == pair.quote.symbol())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_coins_drop_pairs() {
        let pairs = vec![
            CoinPair::new("BTC", "USDT"),
            CoinPair::new("BTC", "EUR"),
            CoinPair::new("EUR", "USDT")
        ];
        let kept = without_excluded(pairs, &["EUR".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].symbol.as_ref(), "BTCUSDT");
    }
}
