use std::str::FromStr;
use std::sync::Arc;
use std::time::{ Duration, Instant };

use anyhow::{ Context, Result };
use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use hmac::{ Hmac, Mac };
use reqwest::{ Client as HttpClient, Method, Url };
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{ debug, error, info };

use crate::error::OrderError;
use crate::exchange::client::{ ExchangeClient, OrderGateway };
use crate::models::binance_models::{
    BinanceAccount,
    BinanceApiError,
    BinanceBookTicker,
    BinanceExchangeInfo,
    BinanceOrderResponse,
    BinanceSymbol,
    BinanceSymbolFilter,
};
use crate::models::coin::CoinPair;
use crate::models::order::{ Fill, OrderRequest, OrderResult, OrderStatus };
use crate::models::ticker::Ticker;

const RECV_WINDOW_MS: u64 = 5000;

// Shared singleton client for connection pooling
lazy_static::lazy_static! {
    static ref HTTP_CLIENT: HttpClient = HttpClient::builder()
        .timeout(Duration::from_secs(10))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .pool_idle_timeout(Some(Duration::from_secs(30)))
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|_| HttpClient::new());
}

pub struct BinanceClient {
    /// Base URL for API requests
    base_url: Url,

    /// API key for authenticated requests
    api_key: Arc<str>,

    /// API secret for request signing
    api_secret: Arc<str>,

    /// Whether to use the testnet
    testnet: bool,
}

impl BinanceClient {
    /// Create a new Binance client
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> Result<Self> {
        // Set the base URL based on whether testnet is enabled
        let base_url = if testnet {
            Url::parse("https://testnet.binance.vision/api/").context("Invalid testnet URL")?
        } else {
            Url::parse("https://api.binance.com/api/").context("Invalid API URL")?
        };

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            testnet,
        })
    }

    /// Decimal places of a filter step such as `"0.00100000"`
    #[inline]
    fn calculate_precision(step_size: &str) -> u8 {
        match step_size.split_once('.') {
            Some((_, decimals)) => decimals.trim_end_matches('0').len() as u8,
            None => 0,
        }
    }

    /// Convert a listed symbol into a pair, `None` unless it is open for spot trading
    fn convert_symbol(symbol: BinanceSymbol) -> Option<CoinPair> {
        if symbol.status != "TRADING" || !symbol.is_spot_trading_allowed {
            return None;
        }

        let mut pair = CoinPair::new(symbol.base_asset.as_str(), symbol.quote_asset.as_str());
        pair.symbol = symbol.symbol.into();

        for filter in &symbol.filters {
            match filter {
                BinanceSymbolFilter::LotSize { min_qty, step_size } => {
                    pair.qty_precision = Self::calculate_precision(step_size);
                    pair.min_qty = min_qty.parse::<f64>().ok().filter(|qty| *qty > 0.0);
                }
                BinanceSymbolFilter::PriceFilter { tick_size } => {
                    pair.price_precision = Self::calculate_precision(tick_size);
                }
                BinanceSymbolFilter::Unknown => {}
            }
        }
        Some(pair)
    }

    /// HMAC-SHA256 of the query string, hex encoded
    fn sign(&self, query: &str) -> String {
        sign_query(&self.api_secret, query)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).with_context(|| format!("Failed to build URL for {}", path))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = HTTP_CLIENT.get(url)
            .header("X-MBX-APIKEY", self.api_key.as_ref())
            .send().await
            .context("Failed to send request to Binance")?;

        // Check if the request was successful
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Binance API error: {} - {}", status, text);
            anyhow::bail!("Binance API error: {} - {}", status, text);
        }

        response.json().await.context("Failed to parse Binance response")
    }

    async fn signed_get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let query = format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            Utc::now().timestamp_millis()
        );
        let signature = self.sign(&query);
        self.get_json(&format!("{}?{}&signature={}", path, query, signature)).await
    }
}

pub(crate) fn sign_query(secret: &str, query: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => {
            return String::new();
        }
    };
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Query string of a new order, in the exchange's parameter names
pub(crate) fn order_query(request: &OrderRequest) -> String {
    format!(
        "symbol={}&side={}&type={}&timeInForce={}&quantity={}&price={}&newClientOrderId={}&newOrderRespType=FULL&recvWindow={}&timestamp={}",
        request.symbol,
        request.side,
        request.order_type,
        request.time_in_force,
        request.quantity,
        request.price,
        request.client_order_id,
        RECV_WINDOW_MS,
        request.timestamp
    )
}

/// Map a FULL order response onto the domain result
pub(crate) fn order_result_from(response: BinanceOrderResponse) -> Result<OrderResult, OrderError> {
    let invalid = |field: &str, value: &str| {
        OrderError::Invalid(format!("unexpected {} in order response: {}", field, value))
    };

    Ok(OrderResult {
        status: OrderStatus::from_str(&response.status).map_err(|_|
            invalid("status", &response.status)
        )?,
        time_in_force: FromStr::from_str(&response.time_in_force).map_err(|_|
            invalid("timeInForce", &response.time_in_force)
        )?,
        order_type: FromStr::from_str(&response.order_type).map_err(|_|
            invalid("type", &response.order_type)
        )?,
        side: FromStr::from_str(&response.side).map_err(|_| invalid("side", &response.side))?,
        transact_time: DateTime::from_timestamp_millis(response.transact_time).unwrap_or_else(
            Utc::now
        ),
        symbol: response.symbol,
        order_id: response.order_id,
        client_order_id: response.client_order_id,
        price: response.price,
        orig_qty: response.orig_qty,
        executed_qty: response.executed_qty,
        cumulative_quote_qty: response.cumulative_quote_qty,
        fills: response.fills
            .into_iter()
            .map(|fill| Fill {
                price: fill.price,
                qty: fill.qty,
                commission: fill.commission.unwrap_or_default(),
                commission_asset: fill.commission_asset,
            })
            .collect(),
    })
}

/// `order/test` validates without matching, so the accepted order is reported as NEW
pub(crate) fn test_order_result(request: &OrderRequest) -> OrderResult {
    OrderResult {
        symbol: request.symbol.clone(),
        order_id: 0,
        client_order_id: request.client_order_id.clone(),
        transact_time: Utc::now(),
        price: request.price,
        orig_qty: request.quantity,
        executed_qty: 0.0,
        cumulative_quote_qty: 0.0,
        status: OrderStatus::New,
        time_in_force: request.time_in_force,
        order_type: request.order_type,
        side: request.side,
        fills: Vec::new(),
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        if self.testnet { "Binance Testnet" } else { "Binance" }
    }

    async fn get_trading_pairs(&self) -> Result<Vec<CoinPair>> {
        let start = Instant::now();
        debug!("Fetching exchange info from Binance");

        let exchange_info: BinanceExchangeInfo = self.get_json("v3/exchangeInfo").await?;
        let listed = exchange_info.symbols.len();
        let pairs: Vec<CoinPair> = exchange_info.symbols
            .into_iter()
            .filter_map(Self::convert_symbol)
            .collect();

        info!(
            listed,
            trading = pairs.len(),
            "Fetched trading pairs from Binance in {:.2?}",
            start.elapsed()
        );
        Ok(pairs)
    }

    async fn get_book_tickers(&self) -> Result<Vec<(String, Ticker)>> {
        let tickers: Vec<BinanceBookTicker> = self.get_json("v3/ticker/bookTicker").await?;
        Ok(
            tickers
                .into_iter()
                .map(|t| {
                    let ticker = Ticker {
                        bid_price: t.bid_price,
                        bid_qty: t.bid_qty,
                        ask_price: t.ask_price,
                        ask_qty: t.ask_qty,
                    };
                    (t.symbol, ticker)
                })
                .collect()
        )
    }

    async fn get_balances(&self) -> Result<Vec<(String, f64)>> {
        let account: BinanceAccount = self
            .signed_get_json("v3/account").await
            .context("Failed to fetch account balances")?;
        Ok(
            account.balances
                .into_iter()
                .filter(|balance| balance.free > 0.0)
                .map(|balance| (balance.asset, balance.free))
                .collect()
        )
    }

    async fn is_operational(&self) -> Result<bool> {
        let url = self.endpoint("v3/ping")?;

        let response = HTTP_CLIENT.get(url)
            .timeout(Duration::from_secs(2)) // Short timeout for ping
            .send().await;

        match response {
            Ok(res) => Ok(res.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl OrderGateway for BinanceClient {
    async fn place(&self, request: &OrderRequest) -> Result<OrderResult, OrderError> {
        let path = if request.test_mode { "v3/order/test" } else { "v3/order" };
        let query = order_query(request);
        let signature = self.sign(&query);

        let url = self
            .endpoint(&format!("{}?{}&signature={}", path, query, signature))
            .map_err(|e| OrderError::Invalid(e.to_string()))?;

        let response = HTTP_CLIENT.request(Method::POST, url)
            .header("X-MBX-APIKEY", self.api_key.as_ref())
            .send().await
            .map_err(|e| {
                if e.is_timeout() { OrderError::Timeout } else { OrderError::Transport(e.to_string()) }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| OrderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<BinanceApiError>(&body) {
                Ok(api_error) => OrderError::Rejected {
                    code: api_error.code,
                    message: api_error.msg,
                },
                Err(_) => OrderError::Transport(format!("{} - {}", status, body)),
            });
        }

        if request.test_mode {
            return Ok(test_order_result(request));
        }

        let order: BinanceOrderResponse = serde_json
            ::from_str(&body)
            .map_err(|e| OrderError::Invalid(format!("unreadable order response: {}", e)))?;
        order_result_from(order)
    }
}
