//! Trade Ledger
//!
//! Authoritative local record of round-trip trades and the SL/TP amendment
//! audit trail, plus the performance aggregation queries over that record.
//!
//! Writes are serialized per order id by the database itself: exits only
//! ever touch rows whose exit_time is still NULL, so finalizing the same
//! order twice is a no-op the second time regardless of which code path
//! (explicit close or reconciliation) gets there first.

use super::models::{
    AmendmentRecord, CloseType, NewAmendment, NewTrade, PerformanceReport, TradeRecord,
};
use super::{DbPool, LedgerError};
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub struct TradeLedger {
    pool: DbPool,
    baseline: OnceCell<f64>,
}

impl TradeLedger {
    pub fn new(pool: DbPool) -> Self {
        TradeLedger {
            pool,
            baseline: OnceCell::new(),
        }
    }

    /// Append a new trade with open exit fields.
    ///
    /// Guards the one-open-record-per-symbol invariant at the database, so
    /// a race between two entry attempts cannot double-book a symbol.
    pub async fn log_trade(&self, trade: NewTrade) -> Result<TradeRecord, LedgerError> {
        let now = Utc::now();
        let rows = sqlx::query(
            r#"
            INSERT INTO trades (order_id, entry_time, symbol, side, size, entry_price, atr, confidence)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            WHERE NOT EXISTS (
                SELECT 1 FROM trades WHERE symbol = ?3 AND exit_time IS NULL
            )
            "#,
        )
        .bind(&trade.order_id)
        .bind(now)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.size)
        .bind(trade.entry_price)
        .bind(trade.atr)
        .bind(trade.confidence)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(LedgerError::OpenTradeExists(trade.symbol));
        }

        debug!("Logged trade {} for {}", trade.order_id, trade.symbol);
        self.trade_by_order_id(&trade.order_id)
            .await?
            .ok_or_else(|| LedgerError::Query(format!("trade {} vanished after insert", trade.order_id)))
    }

    /// Finalize the single open record for an order id.
    ///
    /// Computes realized pnl, duration and reward/risk from the stored
    /// entry fields. Returns `Ok(false)` without touching the ledger when
    /// no open record matches; never creates a record.
    pub async fn update_trade_exit(
        &self,
        order_id: &str,
        exit_price: f64,
        close_type: CloseType,
    ) -> Result<bool, LedgerError> {
        let open = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades WHERE order_id = ?1 AND exit_time IS NULL",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let record = match open {
            Some(record) => record,
            None => {
                debug!("No open trade for order {order_id}; exit update skipped");
                return Ok(false);
            }
        };

        let sign = match record.entry_side() {
            Some(side) => side.pnl_sign(),
            None => {
                warn!(
                    "Trade {} has unparseable side '{}'; exit update skipped",
                    order_id, record.side
                );
                return Ok(false);
            }
        };

        let now = Utc::now();
        let pnl = record.size * (exit_price - record.entry_price) * sign;
        let duration_hours = (now - record.entry_time).num_milliseconds() as f64 / 3_600_000.0;
        let risk = record.atr * record.size;
        let rr_ratio = if risk > 0.0 { Some(pnl.abs() / risk) } else { None };

        let rows = sqlx::query(
            r#"
            UPDATE trades
            SET exit_time = ?1, exit_price = ?2, pnl = ?3, duration_hours = ?4,
                rr_ratio = ?5, close_type = ?6
            WHERE order_id = ?7 AND exit_time IS NULL
            "#,
        )
        .bind(now)
        .bind(exit_price)
        .bind(pnl)
        .bind(duration_hours)
        .bind(rr_ratio)
        .bind(close_type.as_str())
        .bind(order_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows > 0 {
            debug!(
                "Closed trade {} @ {} ({}, pnl {:.4})",
                order_id,
                exit_price,
                close_type.as_str(),
                pnl
            );
        }
        Ok(rows > 0)
    }

    pub async fn trade_by_order_id(
        &self,
        order_id: &str,
    ) -> Result<Option<TradeRecord>, LedgerError> {
        let record =
            sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades WHERE order_id = ?1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    /// Most recent open trade for a symbol, if any.
    pub async fn open_trade_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<TradeRecord>, LedgerError> {
        let record = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades WHERE symbol = ?1 AND exit_time IS NULL \
             ORDER BY entry_time DESC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Symbols that currently hold an open ledger record.
    pub async fn symbols_with_open_trades(&self) -> Result<Vec<String>, LedgerError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT symbol FROM trades WHERE exit_time IS NULL")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Append an accepted SL/TP amendment to the audit trail.
    pub async fn log_amendment(&self, amendment: NewAmendment) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO sl_tp_updates (order_id, timestamp, old_sl, new_sl, old_tp, new_tp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&amendment.order_id)
        .bind(Utc::now())
        .bind(amendment.old_sl)
        .bind(amendment.new_sl)
        .bind(amendment.old_tp)
        .bind(amendment.new_tp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn amendments_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<AmendmentRecord>, LedgerError> {
        let records = sqlx::query_as::<_, AmendmentRecord>(
            "SELECT * FROM sl_tp_updates WHERE order_id = ?1 ORDER BY timestamp ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Capture the equity-curve origin on first use; later calls return the
    /// originally stored value no matter what balance they pass.
    pub async fn ensure_baseline(&self, live_balance: f64) -> Result<f64, LedgerError> {
        let value = self
            .baseline
            .get_or_try_init(|| async {
                sqlx::query(
                    "INSERT OR IGNORE INTO balance_baseline (id, initial_balance, recorded_at) \
                     VALUES (1, ?1, ?2)",
                )
                .bind(live_balance)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

                let (stored,): (f64,) =
                    sqlx::query_as("SELECT initial_balance FROM balance_baseline WHERE id = 1")
                        .fetch_one(&self.pool)
                        .await?;
                Ok::<f64, LedgerError>(stored)
            })
            .await?;
        Ok(*value)
    }

    async fn stored_baseline(&self) -> Result<Option<f64>, LedgerError> {
        if let Some(cached) = self.baseline.get() {
            return Ok(Some(*cached));
        }
        let row: Option<(f64,)> =
            sqlx::query_as("SELECT initial_balance FROM balance_baseline WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Performance metrics over trades whose entry_time falls inside
    /// [start, end] (inclusive, either bound optional).
    pub async fn calculate_performance(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PerformanceReport, LedgerError> {
        let records =
            sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades ORDER BY entry_time ASC")
                .fetch_all(&self.pool)
                .await?;

        let trades: Vec<&TradeRecord> = records
            .iter()
            .filter(|r| start.map_or(true, |s| r.entry_time >= s))
            .filter(|r| end.map_or(true, |e| r.entry_time <= e))
            .collect();

        if trades.is_empty() {
            return Ok(PerformanceReport::empty());
        }

        let baseline = match self.stored_baseline().await? {
            Some(b) => b,
            None => {
                warn!("No balance baseline recorded; equity curve starts at 0");
                0.0
            }
        };

        // Rows still open contribute 0 pnl until their exit is booked.
        let pnls: Vec<f64> = trades.iter().map(|r| r.pnl.unwrap_or(0.0)).collect();
        let n = pnls.len() as f64;

        let wins = pnls.iter().filter(|p| **p > 0.0).count() as f64;
        let win_rate = wins / n;

        let mut equity = baseline;
        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0f64;
        for pnl in &pnls {
            equity += pnl;
            peak = peak.max(equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
        }

        let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).sum::<f64>().abs();
        let profit_factor = if gross_loss > 0.0 {
            Some(gross_profit / gross_loss)
        } else {
            None
        };

        let sharpe_ratio = if pnls.len() >= 2 {
            let mean = pnls.iter().sum::<f64>() / n;
            let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let std = variance.sqrt();
            if std > 0.0 {
                Some(mean / std)
            } else {
                None
            }
        } else {
            None
        };

        Ok(PerformanceReport {
            win_rate: Some(win_rate),
            max_drawdown: Some(max_drawdown),
            profit_factor,
            sharpe_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::OrderSide;
    use crate::persistence::init_database;
    use chrono::Duration;

    async fn ledger() -> TradeLedger {
        let pool = init_database("sqlite::memory:").await.unwrap();
        TradeLedger::new(pool)
    }

    fn trade(order_id: &str, symbol: &str, side: OrderSide) -> NewTrade {
        NewTrade {
            order_id: order_id.to_string(),
            symbol: symbol.to_string(),
            side,
            size: 1.0,
            entry_price: 100.0,
            atr: 2.0,
            confidence: 0.8,
        }
    }

    #[tokio::test]
    async fn test_log_and_exit_pnl_exact() {
        let ledger = ledger().await;
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();

        let updated = ledger
            .update_trade_exit("ord-1", 110.0, CloseType::Manual)
            .await
            .unwrap();
        assert!(updated);

        let record = ledger.trade_by_order_id("ord-1").await.unwrap().unwrap();
        assert_eq!(record.pnl, Some(10.0)); // 1.0 * (110 - 100) * +1
        assert_eq!(record.exit_price, Some(110.0));
        assert_eq!(record.rr_ratio, Some(5.0)); // |10| / (2 * 1)
        assert_eq!(record.close_type.as_deref(), Some("manual"));
        assert!(!record.is_open());
    }

    #[tokio::test]
    async fn test_exit_pnl_sign_for_sell_entry() {
        let ledger = ledger().await;
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Sell)).await.unwrap();
        ledger.update_trade_exit("ord-1", 90.0, CloseType::Manual).await.unwrap();

        let record = ledger.trade_by_order_id("ord-1").await.unwrap().unwrap();
        assert_eq!(record.pnl, Some(10.0)); // 1.0 * (90 - 100) * -1
    }

    #[tokio::test]
    async fn test_exit_update_without_open_record_is_noop() {
        let ledger = ledger().await;
        let updated = ledger
            .update_trade_exit("missing", 110.0, CloseType::Manual)
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_second_exit_update_is_noop() {
        let ledger = ledger().await;
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();

        assert!(ledger.update_trade_exit("ord-1", 110.0, CloseType::Manual).await.unwrap());
        // A later (reconciliation) attempt at a different price must not win
        assert!(!ledger.update_trade_exit("ord-1", 120.0, CloseType::SlTp).await.unwrap());

        let record = ledger.trade_by_order_id("ord-1").await.unwrap().unwrap();
        assert_eq!(record.exit_price, Some(110.0));
        assert_eq!(record.close_type.as_deref(), Some("manual"));
    }

    #[tokio::test]
    async fn test_one_open_record_per_symbol() {
        let ledger = ledger().await;
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();

        let second = ledger.log_trade(trade("ord-2", "BTCUSDT", OrderSide::Buy)).await;
        assert!(matches!(second, Err(LedgerError::OpenTradeExists(_))));

        // After closing, the symbol is free again
        ledger.update_trade_exit("ord-1", 101.0, CloseType::Manual).await.unwrap();
        ledger.log_trade(trade("ord-2", "BTCUSDT", OrderSide::Buy)).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_symbol_queries() {
        let ledger = ledger().await;
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();
        ledger.log_trade(trade("ord-2", "ETHUSDT", OrderSide::Sell)).await.unwrap();
        ledger.update_trade_exit("ord-2", 99.0, CloseType::Manual).await.unwrap();

        let open = ledger.open_trade_by_symbol("BTCUSDT").await.unwrap();
        assert_eq!(open.unwrap().order_id, "ord-1");
        assert!(ledger.open_trade_by_symbol("ETHUSDT").await.unwrap().is_none());

        let symbols = ledger.symbols_with_open_trades().await.unwrap();
        assert_eq!(symbols, vec!["BTCUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_baseline_written_once() {
        let ledger = ledger().await;
        assert_eq!(ledger.ensure_baseline(10_000.0).await.unwrap(), 10_000.0);
        // Second call with a different live balance keeps the original
        assert_eq!(ledger.ensure_baseline(12_345.0).await.unwrap(), 10_000.0);

        // A fresh ledger over the same pool still reads the stored value
        let other = TradeLedger::new(ledger.pool.clone());
        assert_eq!(other.ensure_baseline(99.0).await.unwrap(), 10_000.0);
    }

    #[tokio::test]
    async fn test_amendment_audit_trail() {
        let ledger = ledger().await;
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();
        ledger
            .log_amendment(NewAmendment {
                order_id: "ord-1".into(),
                old_sl: Some(98.0),
                new_sl: 99.0,
                old_tp: Some(104.0),
                new_tp: 106.0,
            })
            .await
            .unwrap();

        let audit = ledger.amendments_for_order("ord-1").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].new_sl, 99.0);
        assert_eq!(audit[0].old_sl, Some(98.0));
    }

    #[tokio::test]
    async fn test_performance_empty_window_all_null() {
        let ledger = ledger().await;
        let report = ledger.calculate_performance(None, None).await.unwrap();
        assert_eq!(report, PerformanceReport::empty());
    }

    #[tokio::test]
    async fn test_performance_single_winning_trade() {
        let ledger = ledger().await;
        ledger.ensure_baseline(10_000.0).await.unwrap();
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();
        ledger.update_trade_exit("ord-1", 110.0, CloseType::Manual).await.unwrap();

        let report = ledger.calculate_performance(None, None).await.unwrap();
        assert_eq!(report.win_rate, Some(1.0));
        assert_eq!(report.max_drawdown, Some(0.0));
        assert_eq!(report.profit_factor, None); // no losses
        assert_eq!(report.sharpe_ratio, None); // single trade
    }

    #[tokio::test]
    async fn test_performance_mixed_trades() {
        let ledger = ledger().await;
        ledger.ensure_baseline(1_000.0).await.unwrap();

        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();
        ledger.update_trade_exit("ord-1", 120.0, CloseType::Manual).await.unwrap();
        ledger.log_trade(trade("ord-2", "ETHUSDT", OrderSide::Buy)).await.unwrap();
        ledger.update_trade_exit("ord-2", 90.0, CloseType::SlTp).await.unwrap();

        let report = ledger.calculate_performance(None, None).await.unwrap();
        assert_eq!(report.win_rate, Some(0.5));
        assert_eq!(report.profit_factor, Some(2.0)); // 20 / |-10|
        // Equity: 1020 then 1010; drawdown 10/1020
        let dd = report.max_drawdown.unwrap();
        assert!((dd - 10.0 / 1020.0).abs() < 1e-12);
        // mean 5, sample std = sqrt(((20-5)^2 + (-10-5)^2) / 1) = 15*sqrt(2)
        let sharpe = report.sharpe_ratio.unwrap();
        assert!((sharpe - 5.0 / (15.0 * 2f64.sqrt())).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_performance_window_filter() {
        let ledger = ledger().await;
        ledger.ensure_baseline(1_000.0).await.unwrap();
        ledger.log_trade(trade("ord-1", "BTCUSDT", OrderSide::Buy)).await.unwrap();
        ledger.update_trade_exit("ord-1", 110.0, CloseType::Manual).await.unwrap();

        // A window entirely in the past excludes the trade
        let past_end = Utc::now() - Duration::days(1);
        let report = ledger.calculate_performance(None, Some(past_end)).await.unwrap();
        assert_eq!(report, PerformanceReport::empty());

        // An inclusive window around now contains it
        let report = ledger
            .calculate_performance(Some(Utc::now() - Duration::hours(1)), Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(report.win_rate, Some(1.0));
    }

    #[tokio::test]
    async fn test_performance_zero_variance_sharpe_null() {
        let ledger = ledger().await;
        ledger.ensure_baseline(1_000.0).await.unwrap();
        for (id, sym) in [("ord-1", "BTCUSDT"), ("ord-2", "ETHUSDT")] {
            ledger.log_trade(trade(id, sym, OrderSide::Buy)).await.unwrap();
            ledger.update_trade_exit(id, 110.0, CloseType::Manual).await.unwrap();
        }
        let report = ledger.calculate_performance(None, None).await.unwrap();
        assert_eq!(report.sharpe_ratio, None);
        assert_eq!(report.win_rate, Some(1.0));
    }
}
