//! Entry orchestration: signal in, bracket-protected position out.

use crate::domain::entities::order::OrderReceipt;
use crate::domain::errors::{EngineError, MarketDataError};
use crate::domain::repositories::market_data::{MarketData, SignalProvider};
use crate::domain::repositories::venue_client::VenueClient;
use crate::domain::services::bracket::BracketOrderExecutor;
use crate::domain::services::position_sizer::PositionSizer;
use crate::persistence::models::NewTrade;
use crate::persistence::TradeLedger;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry-side tunables, split out of the full trading config.
#[derive(Debug, Clone, Copy)]
pub struct EntryPolicy {
    pub risk_pct: f64,
    pub min_confidence: f64,
    pub min_leverage: f64,
    pub max_leverage: f64,
}

/// Opens new positions: consumes a signal and a market snapshot, sizes the
/// position, submits the bracket order and appends the ledger record.
pub struct EntryController {
    venue: Arc<dyn VenueClient>,
    market: Arc<dyn MarketData>,
    signals: Arc<dyn SignalProvider>,
    ledger: Arc<TradeLedger>,
    executor: BracketOrderExecutor,
    sizer: PositionSizer,
    policy: EntryPolicy,
}

impl EntryController {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        market: Arc<dyn MarketData>,
        signals: Arc<dyn SignalProvider>,
        ledger: Arc<TradeLedger>,
        executor: BracketOrderExecutor,
        policy: EntryPolicy,
    ) -> Self {
        EntryController {
            venue,
            market,
            signals,
            ledger,
            executor,
            sizer: PositionSizer::new(),
            policy,
        }
    }

    /// Evaluate one symbol and open a position when everything lines up.
    ///
    /// `Ok(None)` covers every skip: no signal, weak confidence, symbol
    /// already holding an open trade, or a zero size. `Err` means an
    /// attempted entry failed; no position was opened.
    pub async fn check_and_place(&self, symbol: &str) -> Result<Option<OrderReceipt>, EngineError> {
        let signal = match self.signals.latest_signal(symbol).await? {
            Some(signal) => signal,
            None => return Ok(None),
        };

        if signal.confidence < self.policy.min_confidence {
            debug!(
                "Skipping {symbol}: confidence {:.2} below threshold {:.2}",
                signal.confidence, self.policy.min_confidence
            );
            return Ok(None);
        }

        // One live ledger record per symbol: never stack entries
        if self.ledger.open_trade_by_symbol(symbol).await?.is_some() {
            debug!("Skipping {symbol}: open trade already on the books");
            return Ok(None);
        }

        let snapshot = self.market.snapshot(symbol).await?;
        let price = snapshot.close().ok_or_else(|| MarketDataError::NoData {
            symbol: symbol.to_string(),
        })?;

        let balance = self.venue.fetch_balance().await?;
        // First balance sighting seeds the equity-curve origin
        self.ledger.ensure_baseline(balance).await?;

        let size = self
            .sizer
            .size(balance, signal.confidence, price, snapshot.atr, self.policy.risk_pct);
        if size <= 0.0 {
            debug!("Skipping {symbol}: sized to zero (balance {balance}, atr {})", snapshot.atr);
            return Ok(None);
        }

        let leverage = self.sizer.leverage(
            signal.confidence,
            self.policy.min_leverage,
            self.policy.max_leverage,
        );
        info!(
            "Placing {} {symbol} | conf={:.2} | size={:.6} | lev={:.2}x",
            signal.side, signal.confidence, size, leverage
        );

        let receipt = self
            .executor
            .place(symbol, signal.side, size, price, snapshot.atr)
            .await?;

        self.ledger
            .log_trade(NewTrade {
                order_id: receipt.order_id.clone(),
                symbol: symbol.to_string(),
                side: signal.side,
                size,
                entry_price: price,
                atr: snapshot.atr,
                confidence: signal.confidence,
            })
            .await?;

        Ok(Some(receipt))
    }
}
