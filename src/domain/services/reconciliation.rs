//! Reconciliation of venue-side closures against the local ledger.
//!
//! The venue closes positions on its own when a bracket trigger fires;
//! those exits never pass through the engine's code path. Each sweep pulls
//! closed-order history for every symbol with an open ledger record and
//! finalizes the matching rows. Finalization only ever touches rows whose
//! exit_time is still NULL, so replaying the same history is harmless.

use crate::domain::errors::EngineError;
use crate::domain::repositories::venue_client::VenueClient;
use crate::persistence::models::CloseType;
use crate::persistence::TradeLedger;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
const CLOSED_ORDER_FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Ledger records finalized this sweep.
    pub finalized: usize,
    /// Symbols whose history fetch failed and was skipped.
    pub failed_symbols: usize,
}

pub struct Reconciler {
    venue: Arc<dyn VenueClient>,
    lookback: Duration,
    /// Monotonic watermark of scanned history. Only moves forward.
    checkpoint: Mutex<Option<DateTime<Utc>>>,
}

impl Reconciler {
    pub fn new(venue: Arc<dyn VenueClient>, lookback_days: i64) -> Self {
        Reconciler {
            venue,
            lookback: Duration::days(lookback_days),
            checkpoint: Mutex::new(None),
        }
    }

    /// Sweep closed-order history since the checkpoint and finalize any
    /// still-open ledger records the venue has already closed.
    ///
    /// A failed fetch for one symbol is skipped and does not block the
    /// others or hold the checkpoint back; only a ledger failure aborts
    /// the sweep (and then the checkpoint stays put).
    pub async fn reconcile(&self, ledger: &TradeLedger) -> Result<ReconcileSummary, EngineError> {
        let since = self
            .checkpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .unwrap_or_else(|| Utc::now() - self.lookback);

        let symbols = ledger.symbols_with_open_trades().await?;
        let mut summary = ReconcileSummary::default();

        for symbol in &symbols {
            let orders = match self
                .venue
                .fetch_closed_orders(symbol, since, CLOSED_ORDER_FETCH_LIMIT)
                .await
            {
                Ok(orders) => orders,
                Err(e) => {
                    warn!("Reconciliation fetch failed for {symbol}, skipping: {e}");
                    summary.failed_symbols += 1;
                    continue;
                }
            };

            for order in orders {
                let exit_price = match order.average_price {
                    Some(price) => price,
                    None => {
                        warn!(
                            "Closed order {} for {symbol} has no fill price; skipping",
                            order.order_id
                        );
                        continue;
                    }
                };
                let close_type = CloseType::from_venue_kind(order.close_kind.as_deref());
                if ledger
                    .update_trade_exit(&order.order_id, exit_price, close_type)
                    .await?
                {
                    info!(
                        "Reconciled venue-side close of {} ({symbol}) @ {exit_price}",
                        order.order_id
                    );
                    summary.finalized += 1;
                }
            }
        }

        *self
            .checkpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::market::Ticker;
    use crate::domain::entities::order::{
        BracketLevels, ClosedOrder, OrderReceipt, OrderRequest, OrderSide,
    };
    use crate::domain::entities::position::VenuePosition;
    use crate::domain::errors::VenueError;
    use crate::domain::repositories::venue_client::{AmendAck, VenueResult};
    use crate::infrastructure::paper::PaperVenue;
    use crate::persistence::init_database;
    use crate::persistence::models::NewTrade;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    async fn ledger() -> TradeLedger {
        TradeLedger::new(init_database("sqlite::memory:").await.unwrap())
    }

    fn open_trade(order_id: &str, symbol: &str) -> NewTrade {
        NewTrade {
            order_id: order_id.to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            size: 1.0,
            entry_price: 100.0,
            atr: 2.0,
            confidence: 0.8,
        }
    }

    #[tokio::test]
    async fn test_reconcile_finalizes_venue_side_close() {
        let venue = Arc::new(PaperVenue::new(10_000.0));
        venue.set_price("BTCUSDT", 100.0);
        let receipt = venue
            .create_order(
                &OrderRequest::market("BTCUSDT", OrderSide::Buy, 1.0).with_bracket(BracketLevels {
                    stop_loss: 98.0,
                    take_profit: 110.0,
                }),
            )
            .await
            .unwrap();

        let ledger = ledger().await;
        ledger
            .log_trade(open_trade(&receipt.order_id, "BTCUSDT"))
            .await
            .unwrap();

        // The venue's take-profit fires outside the engine's code path
        venue.set_price("BTCUSDT", 111.0);

        let reconciler = Reconciler::new(venue, DEFAULT_LOOKBACK_DAYS);
        let summary = reconciler.reconcile(&ledger).await.unwrap();
        assert_eq!(summary.finalized, 1);

        let record = ledger
            .trade_by_order_id(&receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!record.is_open());
        assert_eq!(record.exit_price, Some(110.0)); // filled at the trigger
        assert_eq!(record.close_type.as_deref(), Some("sl_tp"));
        assert_eq!(record.pnl, Some(10.0));
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let venue = Arc::new(PaperVenue::new(10_000.0));
        venue.set_price("BTCUSDT", 100.0);
        let receipt = venue
            .create_order(
                &OrderRequest::market("BTCUSDT", OrderSide::Buy, 1.0).with_bracket(BracketLevels {
                    stop_loss: 98.0,
                    take_profit: 110.0,
                }),
            )
            .await
            .unwrap();

        let ledger = ledger().await;
        ledger
            .log_trade(open_trade(&receipt.order_id, "BTCUSDT"))
            .await
            .unwrap();
        venue.set_price("BTCUSDT", 97.0);

        let reconciler = Reconciler::new(venue, DEFAULT_LOOKBACK_DAYS);
        let first = reconciler.reconcile(&ledger).await.unwrap();
        assert_eq!(first.finalized, 1);
        let second = reconciler.reconcile(&ledger).await.unwrap();
        assert_eq!(second.finalized, 0);

        let record = ledger
            .trade_by_order_id(&receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.exit_price, Some(98.0));
    }

    /// Venue double that fails history fetches for chosen symbols and
    /// records the `since` watermark it was called with.
    struct FlakyHistoryVenue {
        closed: HashMap<String, Vec<ClosedOrder>>,
        failing: HashSet<String>,
        since_seen: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl VenueClient for FlakyHistoryVenue {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_balance(&self) -> VenueResult<f64> {
            Ok(0.0)
        }

        async fn fetch_positions(&self) -> VenueResult<Vec<VenuePosition>> {
            Ok(vec![])
        }

        async fn fetch_ticker(&self, symbol: &str) -> VenueResult<Ticker> {
            Err(VenueError::UnknownSymbol(symbol.to_string()))
        }

        async fn create_order(&self, _request: &OrderRequest) -> VenueResult<OrderReceipt> {
            Err(VenueError::Rejected("read-only double".to_string()))
        }

        async fn amend_position_stops(
            &self,
            _symbol: &str,
            _stop_loss: f64,
            _take_profit: f64,
        ) -> VenueResult<AmendAck> {
            Ok(AmendAck::NoChange)
        }

        async fn fetch_closed_orders(
            &self,
            symbol: &str,
            since: DateTime<Utc>,
            _limit: usize,
        ) -> VenueResult<Vec<ClosedOrder>> {
            self.since_seen.lock().unwrap().push(since);
            if self.failing.contains(symbol) {
                return Err(VenueError::Network("history endpoint down".to_string()));
            }
            Ok(self.closed.get(symbol).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_failed_symbol_is_isolated_and_checkpoint_advances() {
        let mut closed = HashMap::new();
        closed.insert(
            "ETHUSDT".to_string(),
            vec![ClosedOrder {
                order_id: "ord-eth".to_string(),
                symbol: "ETHUSDT".to_string(),
                average_price: Some(105.0),
                close_kind: None,
                closed_at: Utc::now(),
            }],
        );
        let venue = Arc::new(FlakyHistoryVenue {
            closed,
            failing: HashSet::from(["BTCUSDT".to_string()]),
            since_seen: Mutex::new(vec![]),
        });

        let ledger = ledger().await;
        ledger.log_trade(open_trade("ord-btc", "BTCUSDT")).await.unwrap();
        ledger.log_trade(open_trade("ord-eth", "ETHUSDT")).await.unwrap();

        let reconciler = Reconciler::new(venue.clone(), DEFAULT_LOOKBACK_DAYS);
        let start = Utc::now();
        let summary = reconciler.reconcile(&ledger).await.unwrap();

        // BTC fetch failed but ETH was still reconciled
        assert_eq!(summary.failed_symbols, 1);
        assert_eq!(summary.finalized, 1);
        let eth = ledger.trade_by_order_id("ord-eth").await.unwrap().unwrap();
        assert!(!eth.is_open());
        // Missing venue metadata falls back to sl_tp
        assert_eq!(eth.close_type.as_deref(), Some("sl_tp"));

        // First sweep used the 30-day default watermark, the next sweep
        // starts from the end of this one
        reconciler.reconcile(&ledger).await.unwrap();
        let seen = venue.since_seen.lock().unwrap();
        assert!(seen[0] < start - Duration::days(29));
        assert!(*seen.last().unwrap() >= start);
    }

    #[tokio::test]
    async fn test_close_without_fill_price_is_skipped() {
        let mut closed = HashMap::new();
        closed.insert(
            "BTCUSDT".to_string(),
            vec![ClosedOrder {
                order_id: "ord-btc".to_string(),
                symbol: "BTCUSDT".to_string(),
                average_price: None,
                close_kind: Some("StopLoss".to_string()),
                closed_at: Utc::now(),
            }],
        );
        let venue = Arc::new(FlakyHistoryVenue {
            closed,
            failing: HashSet::new(),
            since_seen: Mutex::new(vec![]),
        });

        let ledger = ledger().await;
        ledger.log_trade(open_trade("ord-btc", "BTCUSDT")).await.unwrap();

        let reconciler = Reconciler::new(venue, DEFAULT_LOOKBACK_DAYS);
        let summary = reconciler.reconcile(&ledger).await.unwrap();
        assert_eq!(summary.finalized, 0);
        assert!(ledger.trade_by_order_id("ord-btc").await.unwrap().unwrap().is_open());
    }
}
