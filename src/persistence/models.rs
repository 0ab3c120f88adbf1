//! Ledger Models
//!
//! Persistent data structures for trade records, stop amendments and the
//! balance baseline.

use crate::domain::entities::order::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a round trip ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseType {
    /// Closed by the engine's own market order.
    Manual,
    /// Closed venue-side by a stop-loss / take-profit trigger.
    SlTp,
    /// The venue reported a closure but not how it happened.
    Unknown,
}

impl CloseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseType::Manual => "manual",
            CloseType::SlTp => "sl_tp",
            CloseType::Unknown => "unknown",
        }
    }

    /// Map venue order-type metadata onto a close type, falling back to
    /// `SlTp` when the venue reports nothing (trigger orders are the only
    /// closures the venue performs on its own).
    pub fn from_venue_kind(kind: Option<&str>) -> CloseType {
        match kind {
            None => CloseType::SlTp,
            Some(k) => {
                let k = k.to_ascii_lowercase();
                if k.contains("stop") || k.contains("profit") || k.contains("sl") || k.contains("tp")
                {
                    CloseType::SlTp
                } else if k.contains("market") || k.contains("limit") {
                    CloseType::Manual
                } else {
                    CloseType::Unknown
                }
            }
        }
    }
}

/// One round-trip trade, keyed by the venue order id.
///
/// Exit fields stay NULL while the position is open; they are written
/// exactly once when the trade reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub order_id: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub symbol: String,
    pub side: String, // "buy" or "sell"
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub duration_hours: Option<f64>,
    pub atr: f64,
    pub rr_ratio: Option<f64>,
    pub confidence: f64,
    pub close_type: Option<String>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    pub fn entry_side(&self) -> Option<OrderSide> {
        OrderSide::parse(&self.side)
    }
}

/// Input for a new ledger entry; entry_time is stamped on insert.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub entry_price: f64,
    pub atr: f64,
    pub confidence: f64,
}

/// One accepted SL/TP amendment, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AmendmentRecord {
    pub id: i64,
    pub order_id: String,
    pub timestamp: DateTime<Utc>,
    pub old_sl: Option<f64>,
    pub new_sl: f64,
    pub old_tp: Option<f64>,
    pub new_tp: f64,
}

/// Input for an amendment audit entry.
#[derive(Debug, Clone)]
pub struct NewAmendment {
    pub order_id: String,
    pub old_sl: Option<f64>,
    pub new_sl: f64,
    pub old_tp: Option<f64>,
    pub new_tp: f64,
}

/// Aggregate performance over a window of trades. Every metric is `None`
/// when the filtered window is empty; profit_factor and sharpe_ratio are
/// additionally `None` when undefined (no losses / fewer than two trades
/// or zero variance).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub win_rate: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub profit_factor: Option<f64>,
    pub sharpe_ratio: Option<f64>,
}

impl PerformanceReport {
    pub fn empty() -> Self {
        PerformanceReport {
            win_rate: None,
            max_drawdown: None,
            profit_factor: None,
            sharpe_ratio: None,
        }
    }
}
