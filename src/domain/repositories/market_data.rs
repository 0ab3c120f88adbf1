//! Market-data and signal collaborator seams.
//!
//! Indicator computation and the classification model live outside this
//! crate. The engine consumes their output through these two traits.

use crate::domain::entities::market::{MarketSnapshot, TradeSignal};
use crate::domain::errors::MarketDataError;
use async_trait::async_trait;

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest short-timeframe snapshot (closes, fast EMA, ATR) for a symbol.
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError>;
}

#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Most recent directional signal for a symbol, or `None` when the
    /// model abstains.
    async fn latest_signal(&self, symbol: &str) -> Result<Option<TradeSignal>, MarketDataError>;
}
