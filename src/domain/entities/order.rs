use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1.0 for buy-entered positions, -1.0 for sell-entered.
    pub fn pnl_sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<OrderSide> {
        match s {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

/// Protective trigger levels attached to an entry order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// An order to be submitted to the venue. Limit orders carry a price;
/// market orders do not. Brackets ride along as venue-side triggers.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub amount: f64,
    pub price: Option<f64>,
    pub bracket: Option<BracketLevels>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, amount: f64) -> Self {
        OrderRequest {
            symbol: symbol.into(),
            order_type: OrderType::Market,
            side,
            amount,
            price: None,
            bracket: None,
        }
    }

    pub fn with_bracket(mut self, levels: BracketLevels) -> Self {
        self.bracket = Some(levels);
        self
    }
}

/// Venue acknowledgement of a submitted order.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    /// Fill price when the venue reports one immediately.
    pub average_price: Option<f64>,
}

/// An order the venue reports as closed, from closed-order history.
#[derive(Debug, Clone)]
pub struct ClosedOrder {
    pub order_id: String,
    pub symbol: String,
    /// Average fill price of the closing execution.
    pub average_price: Option<f64>,
    /// Venue-side order-type metadata, e.g. "StopLoss" / "TakeProfit".
    /// Absent on venues that do not report it.
    pub close_kind: Option<String>,
    pub closed_at: DateTime<Utc>,
}
