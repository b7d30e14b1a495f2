use serde::{ Deserialize, Serialize };

use crate::utils::serde_helpers::{ deserialize_f64_str, deserialize_opt_f64_str };

/// `GET /api/v3/exchangeInfo`
#[derive(Debug, Deserialize)]
pub struct BinanceExchangeInfo {
    pub symbols: Vec<BinanceSymbol>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BinanceSymbol {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub is_spot_trading_allowed: bool,
    #[serde(default)]
    pub filters: Vec<BinanceSymbolFilter>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "filterType")]
pub enum BinanceSymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")] PriceFilter {
        tick_size: String,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")] LotSize {
        min_qty: String,
        step_size: String,
    },
    #[serde(other)]
    Unknown,
}

/// Entry of `GET /api/v3/ticker/bookTicker`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceBookTicker {
    pub symbol: String,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub bid_price: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub bid_qty: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub ask_price: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub ask_qty: f64,
}

/// `<symbol>@bookTicker` payload
#[derive(Debug, Deserialize)]
pub struct BinanceBookTickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", deserialize_with = "deserialize_f64_str")]
    pub bid_price: f64,
    #[serde(rename = "B", deserialize_with = "deserialize_f64_str")]
    pub bid_qty: f64,
    #[serde(rename = "a", deserialize_with = "deserialize_f64_str")]
    pub ask_price: f64,
    #[serde(rename = "A", deserialize_with = "deserialize_f64_str")]
    pub ask_qty: f64,
}

/// Combined stream envelope `{"stream": .., "data": ..}`
#[derive(Debug, Deserialize)]
pub struct BinanceStreamMessage<T> {
    pub stream: String,
    pub data: T,
}

/// Websocket message for subscribing to streams
#[derive(Debug, Serialize)]
pub struct StreamSubscription {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

/// `GET /api/v3/account`
#[derive(Debug, Deserialize)]
pub struct BinanceAccount {
    pub balances: Vec<BinanceBalance>,
}

#[derive(Debug, Deserialize)]
pub struct BinanceBalance {
    pub asset: String,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub free: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub locked: f64,
}

/// `POST /api/v3/order` with `newOrderRespType=FULL`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub transact_time: i64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub price: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub orig_qty: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub executed_qty: f64,
    #[serde(rename = "cummulativeQuoteQty", deserialize_with = "deserialize_f64_str")]
    pub cumulative_quote_qty: f64,
    pub status: String,
    pub time_in_force: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(default)]
    pub fills: Vec<BinanceFill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFill {
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub price: f64,
    #[serde(deserialize_with = "deserialize_f64_str")]
    pub qty: f64,
    #[serde(default, deserialize_with = "deserialize_opt_f64_str")]
    pub commission: Option<f64>,
    #[serde(default)]
    pub commission_asset: String,
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub struct BinanceApiError {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exchange_info_symbol() {
        let json = r#"{"symbols":[{"symbol":"ETHBTC","status":"TRADING","baseAsset":"ETH",
            "quoteAsset":"BTC","isSpotTradingAllowed":true,"filters":[
            {"filterType":"PRICE_FILTER","minPrice":"0.00001","maxPrice":"922327","tickSize":"0.00001"},
            {"filterType":"LOT_SIZE","minQty":"0.0001","maxQty":"100000","stepSize":"0.0001"},
            {"filterType":"ICEBERG_PARTS","limit":10}]}]}"#;

        let info: BinanceExchangeInfo = serde_json::from_str(json).unwrap();
        let symbol = &info.symbols[0];
        assert_eq!(symbol.base_asset, "ETH");
        assert!(symbol.is_spot_trading_allowed);
        assert!(matches!(symbol.filters[2], BinanceSymbolFilter::Unknown));
        assert!(
            matches!(&symbol.filters[1], BinanceSymbolFilter::LotSize { step_size, .. } if step_size == "0.0001")
        );
    }

    #[test]
    fn test_parse_book_ticker_stream() {
        let json = r#"{"stream":"bnbusdt@bookTicker","data":{"u":400900217,"s":"BNBUSDT",
            "b":"25.35190000","B":"31.21000000","a":"25.36520000","A":"40.66000000"}}"#;

        let msg: BinanceStreamMessage<BinanceBookTickerEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(msg.data.symbol, "BNBUSDT");
        assert_eq!(msg.data.bid_price, 25.3519);
        assert_eq!(msg.data.ask_qty, 40.66);
    }

    #[test]
    fn test_parse_full_order_response() {
        let json = r#"{"symbol":"BTCUSDT","orderId":28,"orderListId":-1,
            "clientOrderId":"BTCUSDT_1507725176595","transactTime":1507725176595,
            "price":"50000.00","origQty":"0.0010","executedQty":"0.0010",
            "cummulativeQuoteQty":"50.00","status":"FILLED","timeInForce":"IOC",
            "type":"LIMIT","side":"SELL","fills":[{"price":"50000.00","qty":"0.0010",
            "commission":"0.05","commissionAsset":"USDT","tradeId":56}]}"#;

        let order: BinanceOrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, 28);
        assert_eq!(order.cumulative_quote_qty, 50.0);
        assert_eq!(order.fills[0].commission, Some(0.05));
    }
}
