use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use strum_macros::{ AsRefStr, Display, EnumString };
use uuid::Uuid;

use super::coin::Coin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
pub enum TimeInForce {
    #[serde(rename = "IOC")]
    #[strum(serialize = "IOC")]
    Ioc,
    #[serde(rename = "GTC")]
    #[strum(serialize = "GTC")]
    Gtc,
    #[serde(rename = "FOK")]
    #[strum(serialize = "FOK")]
    Fok,
}

/// Exchange order status plus `Error` for legs that never reached a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    ExpiredInMatch,
    Error,
}

/// One order as sent to the exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: f64,
    pub price: f64,
    pub client_order_id: String,
    /// Millisecond nonce, also used as the request timestamp
    pub timestamp: i64,
    /// Validate only, nothing is matched
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
    pub commission: f64,
    pub commission_asset: String,
}

/// Exchange answer for a placed order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderResult {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub transact_time: DateTime<Utc>,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub fills: Vec<Fill>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinBalance {
    pub coin: Coin,
    pub free: Option<f64>,
}

/// Order status change record handed to the event sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatusEvent {
    pub status: OrderStatus,
    pub opportunity_id: Uuid,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
    pub fills: Vec<Fill>,
    pub error_message: Option<String>,
    pub transact_time: DateTime<Utc>,
    pub balances: Vec<CoinBalance>,
}

impl OrderStatusEvent {
    /// Pre-trade record for a request that is about to be sent
    pub fn new_order(opportunity_id: Uuid, request: &OrderRequest, balances: Vec<CoinBalance>) -> Self {
        Self {
            status: OrderStatus::New,
            opportunity_id,
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            price: request.price,
            orig_qty: request.quantity,
            executed_qty: 0.0,
            cumulative_quote_qty: 0.0,
            fills: Vec::new(),
            error_message: None,
            transact_time: Utc::now(),
            balances,
        }
    }

    pub fn from_result(opportunity_id: Uuid, result: &OrderResult, balances: Vec<CoinBalance>) -> Self {
        Self {
            status: result.status,
            opportunity_id,
            client_order_id: result.client_order_id.clone(),
            symbol: result.symbol.clone(),
            side: result.side,
            order_type: result.order_type,
            time_in_force: result.time_in_force,
            price: result.price,
            orig_qty: result.orig_qty,
            executed_qty: result.executed_qty,
            cumulative_quote_qty: result.cumulative_quote_qty,
            fills: result.fills.clone(),
            error_message: None,
            transact_time: result.transact_time,
            balances,
        }
    }

    pub fn from_error(
        opportunity_id: Uuid,
        request: &OrderRequest,
        error: String,
        balances: Vec<CoinBalance>
    ) -> Self {
        Self {
            status: OrderStatus::Error,
            error_message: Some(error),
            ..Self::new_order(opportunity_id, request, balances)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_wire_names() {
        assert_eq!(OrderSide::Buy.as_ref(), "BUY");
        assert_eq!(OrderType::Limit.to_string(), "LIMIT");
        assert_eq!(TimeInForce::Ioc.as_ref(), "IOC");
        assert_eq!(OrderStatus::from_str("PARTIALLY_FILLED").unwrap(), OrderStatus::PartiallyFilled);
        assert_eq!(
            serde_json::to_string(&OrderStatus::ExpiredInMatch).unwrap(),
            "\"EXPIRED_IN_MATCH\""
        );
    }
}
