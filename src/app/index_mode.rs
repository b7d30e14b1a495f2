use std::sync::Arc;

use anyhow::{ Context, Result };
use tracing::info;

use crate::{
    config::Config,
    exchange::{ binance::BinanceClient, client::ExchangeClient },
    utils::console::print_triangles,
};

/// Build the triangle index once, print it and exit
pub fn run_index_mode(config: Config) -> Result<()> {
    let client: Arc<dyn ExchangeClient> = Arc::new(
        BinanceClient::new(config.api_key.clone(), config.api_secret.clone(), config.testnet).context(
            "Failed to create Binance client"
        )?
    );

    let rt = super::build_runtime()?;
    let index = rt.block_on(super::load_index(&client, &config.excluded_coins))?;

    let triangles = index.to_sorted_vec();
    print_triangles(&triangles);
    info!(
        triangles = index.len(),
        rejected = index.rejected(),
        symbols = index.symbols().len(),
        "Triangle index printed"
    );
    Ok(())
}
