//! Management cycle over open positions.
//!
//! One cycle reconciles venue-side closures first, then walks every open
//! position independently: exit check, trailing adjustment, venue amend
//! with audit, and a short pause after each push. A failure on one symbol
//! never aborts the others; only ledger unavailability is fatal to the
//! cycle. The same per-symbol tolerance applies to the shutdown
//! liquidation path.

use crate::domain::entities::order::OrderRequest;
use crate::domain::entities::position::VenuePosition;
use crate::domain::errors::{EngineError, MarketDataError};
use crate::domain::repositories::market_data::MarketData;
use crate::domain::repositories::venue_client::{AmendAck, VenueClient};
use crate::domain::services::exit_evaluator::should_exit;
use crate::domain::services::reconciliation::Reconciler;
use crate::domain::services::trailing::{adjust_levels, TrailingInput, TrailingTunables};
use crate::persistence::models::{CloseType, NewAmendment};
use crate::persistence::TradeLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Tunables for the management cycle.
#[derive(Debug, Clone, Copy)]
pub struct ManagementPolicy {
    pub adverse_close_window: usize,
    /// Minimum relative level change (vs the current close) worth pushing
    /// to the venue.
    pub amend_epsilon: f64,
    /// Backpressure pause after each amendment push.
    pub amend_pause: Duration,
    pub trailing: TrailingTunables,
}

impl Default for ManagementPolicy {
    fn default() -> Self {
        ManagementPolicy {
            adverse_close_window: 3,
            amend_epsilon: 5e-9,
            amend_pause: Duration::from_millis(300),
            trailing: TrailingTunables::default(),
        }
    }
}

pub struct PositionManager {
    venue: Arc<dyn VenueClient>,
    market: Arc<dyn MarketData>,
    ledger: Arc<TradeLedger>,
    reconciler: Reconciler,
    policy: ManagementPolicy,
}

impl PositionManager {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        market: Arc<dyn MarketData>,
        ledger: Arc<TradeLedger>,
        reconciler: Reconciler,
        policy: ManagementPolicy,
    ) -> Self {
        PositionManager {
            venue,
            market,
            ledger,
            reconciler,
            policy,
        }
    }

    /// One management cycle: reconcile, then manage every open position.
    pub async fn run_cycle(&self) -> Result<(), EngineError> {
        let summary = self.reconciler.reconcile(&self.ledger).await?;
        if summary.finalized > 0 || summary.failed_symbols > 0 {
            info!(
                "Reconciliation: {} trade(s) finalized, {} symbol(s) skipped",
                summary.finalized, summary.failed_symbols
            );
        }

        let positions = self.venue.fetch_positions().await?;
        for position in positions.iter().filter(|p| !p.is_flat()) {
            if let Err(e) = self.manage_position(position).await {
                // Ledger loss is the one failure the cycle cannot shrug off
                if matches!(e, EngineError::Ledger(_)) {
                    return Err(e);
                }
                error!("Error managing {}, skipping this cycle: {e}", position.symbol);
            }
        }
        Ok(())
    }

    async fn manage_position(&self, position: &VenuePosition) -> Result<(), EngineError> {
        let symbol = position.symbol.as_str();
        let snapshot = self.market.snapshot(symbol).await?;
        let close = snapshot.close().ok_or_else(|| MarketDataError::NoData {
            symbol: symbol.to_string(),
        })?;

        if should_exit(
            position.side,
            &snapshot.closes,
            &snapshot.ema_fast,
            self.policy.adverse_close_window,
        ) {
            info!(
                "Adverse-close streak on {symbol}; force-closing {} position",
                position.side
            );
            return self.close_position(position, close).await;
        }

        let ema_fast = snapshot.last_ema_fast().ok_or_else(|| MarketDataError::NoData {
            symbol: symbol.to_string(),
        })?;
        let ticker = self.venue.fetch_ticker(symbol).await?;

        let levels = adjust_levels(
            &TrailingInput {
                side: position.side,
                close,
                prev_stop_loss: position.stop_loss,
                prev_take_profit: position.take_profit,
                mark_price: ticker.mark_price,
                atr: snapshot.atr,
                ema_fast,
            },
            &self.policy.trailing,
        );
        if levels.clamped_stop_loss {
            warn!(
                "{symbol}: stop clamped off mark price {} to {:.6}",
                ticker.mark_price, levels.stop_loss
            );
        }
        if levels.clamped_take_profit {
            warn!(
                "{symbol}: target clamped off mark price {} to {:.6}",
                ticker.mark_price, levels.take_profit
            );
        }

        let epsilon = close * self.policy.amend_epsilon;
        let sl_changed =
            (levels.stop_loss - position.stop_loss.unwrap_or(0.0)).abs() > epsilon;
        let tp_changed =
            (levels.take_profit - position.take_profit.unwrap_or(0.0)).abs() > epsilon;
        if !sl_changed && !tp_changed {
            return Ok(());
        }

        let open_trade = self.ledger.open_trade_by_symbol(symbol).await?;
        match self
            .venue
            .amend_position_stops(symbol, levels.stop_loss, levels.take_profit)
            .await
        {
            Ok(AmendAck::Applied) => {
                info!(
                    "Updated SL/TP for {symbol} | SL={:.4} TP={:.4}",
                    levels.stop_loss, levels.take_profit
                );
                match open_trade {
                    Some(trade) => {
                        self.ledger
                            .log_amendment(NewAmendment {
                                order_id: trade.order_id,
                                old_sl: position.stop_loss,
                                new_sl: levels.stop_loss,
                                old_tp: position.take_profit,
                                new_tp: levels.take_profit,
                            })
                            .await?;
                    }
                    None => warn!("No open trade on the books for {symbol}; amend not audited"),
                }
            }
            Ok(AmendAck::NoChange) => debug!("{symbol}: venue reports no SL/TP change"),
            Err(e) => warn!("SL/TP update failed for {symbol}: {e}"),
        }

        sleep(self.policy.amend_pause).await;
        Ok(())
    }

    /// Close a position with an offsetting market order and finalize the
    /// matching ledger record.
    async fn close_position(
        &self,
        position: &VenuePosition,
        exit_price: f64,
    ) -> Result<(), EngineError> {
        let symbol = position.symbol.as_str();
        let request = OrderRequest::market(
            symbol,
            position.side.closing_order_side(),
            position.size.abs(),
        );
        self.venue.create_order(&request).await?;
        info!("Closed {symbol} position @ {exit_price}");

        match self.ledger.open_trade_by_symbol(symbol).await? {
            Some(trade) => {
                let updated = self
                    .ledger
                    .update_trade_exit(&trade.order_id, exit_price, CloseType::Manual)
                    .await?;
                if !updated {
                    warn!("Trade {} was already finalized elsewhere", trade.order_id);
                }
            }
            None => warn!("No open trade found for {symbol} to update exit"),
        }
        Ok(())
    }

    /// Orderly liquidation: close every open position, tolerating
    /// individual failures, then return. Used on shutdown.
    pub async fn close_all_positions(&self) -> Result<(), EngineError> {
        let positions = self.venue.fetch_positions().await?;
        for position in positions.iter().filter(|p| !p.is_flat()) {
            let exit_price = match self.venue.fetch_ticker(&position.symbol).await {
                Ok(ticker) => ticker.last,
                Err(e) => {
                    error!("Cannot price {} for liquidation: {e}", position.symbol);
                    continue;
                }
            };
            if let Err(e) = self.close_position(position, exit_price).await {
                error!("Failed to liquidate {}: {e}", position.symbol);
            }
        }
        Ok(())
    }
}
