//! Paper-trading infrastructure.
//!
//! An in-process venue that fills orders instantly, honors bracket
//! triggers against its own mark price, and serves closed-order history —
//! the same demo mode the engine would get from a venue's test environment,
//! without any wire protocol. `PaperVenue` is deterministic (prices only
//! move when told to), which also makes it the scripted double for the
//! e2e tests. `PaperSession` adds a seeded random-walk feed and a toy
//! signal source so the binary can run end to end with no external venue.

use crate::domain::entities::market::{MarketSnapshot, Ticker, TradeSignal};
use crate::domain::entities::order::{
    ClosedOrder, OrderReceipt, OrderRequest, OrderSide,
};
use crate::domain::entities::position::{PositionSide, VenuePosition};
use crate::domain::errors::{MarketDataError, VenueError};
use crate::domain::repositories::market_data::{MarketData, SignalProvider};
use crate::domain::repositories::venue_client::{AmendAck, VenueClient, VenueResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone)]
struct PaperPosition {
    order_id: String,
    side: PositionSide,
    size: f64,
    entry_price: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

#[derive(Debug, Default)]
struct PaperBook {
    balance: f64,
    marks: HashMap<String, f64>,
    positions: HashMap<String, PaperPosition>,
    closed: Vec<ClosedOrder>,
    next_order_id: u64,
}

/// Simulated venue. One position slot per symbol; bracket triggers fire
/// when `set_price` crosses them and the closure lands in closed-order
/// history under the entry order id, the way the live venue reports
/// trigger closures.
pub struct PaperVenue {
    book: Mutex<PaperBook>,
}

impl PaperVenue {
    pub fn new(initial_balance: f64) -> Self {
        PaperVenue {
            book: Mutex::new(PaperBook {
                balance: initial_balance,
                ..PaperBook::default()
            }),
        }
    }

    /// Move the mark price and fire any bracket trigger it crosses.
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut book = self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        book.marks.insert(symbol.to_string(), price);

        let triggered = book.positions.get(symbol).and_then(|pos| {
            let stop_hit = pos.stop_loss.map_or(false, |sl| match pos.side {
                PositionSide::Long => price <= sl,
                PositionSide::Short => price >= sl,
            });
            let target_hit = pos.take_profit.map_or(false, |tp| match pos.side {
                PositionSide::Long => price >= tp,
                PositionSide::Short => price <= tp,
            });
            if stop_hit {
                Some((pos.clone(), pos.stop_loss, "StopLoss"))
            } else if target_hit {
                Some((pos.clone(), pos.take_profit, "TakeProfit"))
            } else {
                None
            }
        });

        if let Some((pos, level, kind)) = triggered {
            let fill = level.unwrap_or(price);
            book.positions.remove(symbol);
            let sign = match pos.side {
                PositionSide::Long => 1.0,
                PositionSide::Short => -1.0,
            };
            book.balance += pos.size * (fill - pos.entry_price) * sign;
            book.closed.push(ClosedOrder {
                order_id: pos.order_id.clone(),
                symbol: symbol.to_string(),
                average_price: Some(fill),
                close_kind: Some(kind.to_string()),
                closed_at: Utc::now(),
            });
            info!("[paper] {kind} triggered for {symbol} @ {fill}");
        }
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner).marks.get(symbol).copied()
    }

    pub fn open_position_count(&self) -> usize {
        self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner).positions.len()
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    async fn fetch_balance(&self) -> VenueResult<f64> {
        Ok(self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner).balance)
    }

    async fn fetch_positions(&self) -> VenueResult<Vec<VenuePosition>> {
        let book = self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(book
            .positions
            .iter()
            .map(|(symbol, pos)| VenuePosition {
                symbol: symbol.clone(),
                side: pos.side,
                size: pos.size,
                stop_loss: pos.stop_loss,
                take_profit: pos.take_profit,
            })
            .collect())
    }

    async fn fetch_ticker(&self, symbol: &str) -> VenueResult<Ticker> {
        let book = self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let price = book
            .marks
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))?;
        Ok(Ticker {
            last: price,
            mark_price: price,
        })
    }

    async fn create_order(&self, request: &OrderRequest) -> VenueResult<OrderReceipt> {
        let mut book = self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mark = book
            .marks
            .get(&request.symbol)
            .copied()
            .ok_or_else(|| VenueError::UnknownSymbol(request.symbol.clone()))?;
        let fill = request.price.unwrap_or(mark);

        if request.amount <= 0.0 {
            return Err(VenueError::Rejected("amount must be positive".to_string()));
        }

        let order_id = format!("paper-{}", book.next_order_id);
        book.next_order_id += 1;

        match request.bracket {
            Some(levels) => {
                // Entry order with protective triggers attached
                if book.positions.contains_key(&request.symbol) {
                    return Err(VenueError::Rejected(format!(
                        "position already open for {}",
                        request.symbol
                    )));
                }
                book.positions.insert(
                    request.symbol.clone(),
                    PaperPosition {
                        order_id: order_id.clone(),
                        side: PositionSide::from_order_side(request.side),
                        size: request.amount,
                        entry_price: fill,
                        stop_loss: Some(levels.stop_loss),
                        take_profit: Some(levels.take_profit),
                    },
                );
            }
            None => {
                // Plain market order: offsets the open position
                let pos = book.positions.get(&request.symbol).cloned().ok_or_else(|| {
                    VenueError::Rejected(format!("no open position for {}", request.symbol))
                })?;
                if pos.side.closing_order_side() != request.side {
                    return Err(VenueError::Rejected(
                        "order side does not offset the open position".to_string(),
                    ));
                }
                book.positions.remove(&request.symbol);
                let sign = match pos.side {
                    PositionSide::Long => 1.0,
                    PositionSide::Short => -1.0,
                };
                book.balance += pos.size * (fill - pos.entry_price) * sign;
                // The closing execution shows up in history under its own
                // fresh id, not the entry id
                book.closed.push(ClosedOrder {
                    order_id: order_id.clone(),
                    symbol: request.symbol.clone(),
                    average_price: Some(fill),
                    close_kind: Some("Market".to_string()),
                    closed_at: Utc::now(),
                });
            }
        }

        Ok(OrderReceipt {
            order_id,
            symbol: request.symbol.clone(),
            side: request.side,
            amount: request.amount,
            average_price: Some(fill),
        })
    }

    async fn amend_position_stops(
        &self,
        symbol: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> VenueResult<AmendAck> {
        let mut book = self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let pos = book
            .positions
            .get_mut(symbol)
            .ok_or_else(|| VenueError::Rejected(format!("no open position for {symbol}")))?;

        let unchanged =
            pos.stop_loss == Some(stop_loss) && pos.take_profit == Some(take_profit);
        if unchanged {
            return Ok(AmendAck::NoChange);
        }
        pos.stop_loss = Some(stop_loss);
        pos.take_profit = Some(take_profit);
        Ok(AmendAck::Applied)
    }

    async fn fetch_closed_orders(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> VenueResult<Vec<ClosedOrder>> {
        let book = self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(book
            .closed
            .iter()
            .filter(|o| o.symbol == symbol && o.closed_at >= since)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Snapshot store fed by whoever drives the paper prices.
#[derive(Default)]
pub struct PaperMarket {
    snapshots: Mutex<HashMap<String, MarketSnapshot>>,
}

impl PaperMarket {
    pub fn new() -> Self {
        PaperMarket::default()
    }

    pub fn set_snapshot(&self, symbol: &str, snapshot: MarketSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(symbol.to_string(), snapshot);
    }
}

#[async_trait]
impl MarketData for PaperMarket {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        self.snapshots
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| MarketDataError::NoData {
                symbol: symbol.to_string(),
            })
    }
}

/// Signal store with a manual setter; the demo session overwrites it each
/// tick, tests pin it.
#[derive(Default)]
pub struct PaperSignals {
    signals: Mutex<HashMap<String, TradeSignal>>,
}

impl PaperSignals {
    pub fn new() -> Self {
        PaperSignals::default()
    }

    pub fn set_signal(&self, symbol: &str, signal: TradeSignal) {
        self.signals
            .lock()
            .unwrap()
            .insert(symbol.to_string(), signal);
    }

    pub fn clear_signal(&self, symbol: &str) {
        self.signals.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(symbol);
    }
}

#[async_trait]
impl SignalProvider for PaperSignals {
    async fn latest_signal(
        &self,
        symbol: &str,
    ) -> Result<Option<TradeSignal>, MarketDataError> {
        Ok(self.signals.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(symbol).copied())
    }
}

/// Everything the binary needs to run without a live venue: deterministic
/// venue + snapshot store + signal store, advanced by a seeded random walk.
pub struct PaperSession {
    pub venue: Arc<PaperVenue>,
    pub market: Arc<PaperMarket>,
    pub signals: Arc<PaperSignals>,
    symbols: Vec<String>,
    walk: Mutex<WalkState>,
}

struct WalkState {
    rng: StdRng,
    closes: HashMap<String, Vec<f64>>,
}

const WALK_HISTORY: usize = 50;

impl PaperSession {
    pub fn new(symbols: &[String], initial_balance: f64, start_price: f64, seed: u64) -> Self {
        let venue = Arc::new(PaperVenue::new(initial_balance));
        let mut closes = HashMap::new();
        for symbol in symbols {
            venue.set_price(symbol, start_price);
            closes.insert(symbol.clone(), vec![start_price]);
        }
        PaperSession {
            venue,
            market: Arc::new(PaperMarket::new()),
            signals: Arc::new(PaperSignals::new()),
            symbols: symbols.to_vec(),
            walk: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                closes,
            }),
        }
    }

    /// Advance every symbol one tick: random-walk the price, refresh the
    /// snapshot, and occasionally emit a directional signal. The snapshot
    /// values are synthesized for the simulation; real indicator
    /// computation lives outside this crate.
    pub fn step(&self) {
        let mut walk = self.walk.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for symbol in &self.symbols {
            let (price, signal) = {
                let closes = walk.closes.get(symbol).map(|c| c.clone()).unwrap_or_default();
                let last = closes.last().copied().unwrap_or(100.0);
                let drift: f64 = walk.rng.gen_range(-0.004..0.004);
                let price = (last * (1.0 + drift)).max(0.01);

                let signal = if walk.rng.gen_bool(0.05) {
                    let side = if walk.rng.gen_bool(0.5) {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    };
                    Some(TradeSignal {
                        side,
                        confidence: walk.rng.gen_range(0.5..1.0),
                    })
                } else {
                    None
                };
                (price, signal)
            };

            self.venue.set_price(symbol, price);
            let closes = walk.closes.entry(symbol.clone()).or_default();
            closes.push(price);
            if closes.len() > WALK_HISTORY {
                closes.remove(0);
            }

            let ema_fast: Vec<f64> = closes
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let lo = i.saturating_sub(4);
                    let window = &closes[lo..=i];
                    window.iter().sum::<f64>() / window.len() as f64
                })
                .collect();
            self.market.set_snapshot(
                symbol,
                MarketSnapshot {
                    closes: closes.clone(),
                    ema_fast,
                    atr: price * 0.005,
                },
            );

            match signal {
                Some(signal) => self.signals.set_signal(symbol, signal),
                None => self.signals.clear_signal(symbol),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::BracketLevels;

    fn buy_with_bracket(symbol: &str, amount: f64, sl: f64, tp: f64) -> OrderRequest {
        OrderRequest::market(symbol, OrderSide::Buy, amount).with_bracket(BracketLevels {
            stop_loss: sl,
            take_profit: tp,
        })
    }

    #[tokio::test]
    async fn test_entry_fill_and_position() {
        let venue = PaperVenue::new(10_000.0);
        venue.set_price("BTCUSDT", 100.0);

        let receipt = venue
            .create_order(&buy_with_bracket("BTCUSDT", 0.5, 98.0, 110.0))
            .await
            .unwrap();
        assert_eq!(receipt.average_price, Some(100.0));

        let positions = venue.fetch_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].stop_loss, Some(98.0));
        assert_eq!(positions[0].take_profit, Some(110.0));
    }

    #[tokio::test]
    async fn test_stop_trigger_closes_under_entry_id() {
        let venue = PaperVenue::new(10_000.0);
        venue.set_price("BTCUSDT", 100.0);
        let receipt = venue
            .create_order(&buy_with_bracket("BTCUSDT", 1.0, 98.0, 110.0))
            .await
            .unwrap();

        venue.set_price("BTCUSDT", 97.5); // through the stop
        assert_eq!(venue.open_position_count(), 0);

        let closed = venue
            .fetch_closed_orders("BTCUSDT", Utc::now() - chrono::Duration::hours(1), 100)
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].order_id, receipt.order_id);
        assert_eq!(closed[0].average_price, Some(98.0)); // filled at the trigger
        assert_eq!(closed[0].close_kind.as_deref(), Some("StopLoss"));

        // Loss realized against the balance: 1.0 * (98 - 100)
        assert_eq!(venue.fetch_balance().await.unwrap(), 9_998.0);
    }

    #[tokio::test]
    async fn test_manual_close_uses_fresh_order_id() {
        let venue = PaperVenue::new(10_000.0);
        venue.set_price("BTCUSDT", 100.0);
        let entry = venue
            .create_order(&buy_with_bracket("BTCUSDT", 1.0, 90.0, 150.0))
            .await
            .unwrap();

        venue.set_price("BTCUSDT", 105.0);
        let close = venue
            .create_order(&OrderRequest::market("BTCUSDT", OrderSide::Sell, 1.0))
            .await
            .unwrap();
        assert_ne!(close.order_id, entry.order_id);
        assert_eq!(venue.open_position_count(), 0);
        assert_eq!(venue.fetch_balance().await.unwrap(), 10_005.0);
    }

    #[tokio::test]
    async fn test_amend_ack_distinguishes_no_change() {
        let venue = PaperVenue::new(10_000.0);
        venue.set_price("BTCUSDT", 100.0);
        venue
            .create_order(&buy_with_bracket("BTCUSDT", 1.0, 98.0, 110.0))
            .await
            .unwrap();

        let ack = venue.amend_position_stops("BTCUSDT", 99.0, 112.0).await.unwrap();
        assert_eq!(ack, AmendAck::Applied);
        let ack = venue.amend_position_stops("BTCUSDT", 99.0, 112.0).await.unwrap();
        assert_eq!(ack, AmendAck::NoChange);

        let err = venue.amend_position_stops("ETHUSDT", 1.0, 2.0).await;
        assert!(matches!(err, Err(VenueError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_second_entry_on_symbol_rejected() {
        let venue = PaperVenue::new(10_000.0);
        venue.set_price("BTCUSDT", 100.0);
        venue
            .create_order(&buy_with_bracket("BTCUSDT", 1.0, 98.0, 110.0))
            .await
            .unwrap();
        let second = venue
            .create_order(&buy_with_bracket("BTCUSDT", 1.0, 98.0, 110.0))
            .await;
        assert!(matches!(second, Err(VenueError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_session_step_produces_snapshots() {
        let session = PaperSession::new(&["BTCUSDT".to_string()], 10_000.0, 100.0, 42);
        for _ in 0..10 {
            session.step();
        }
        let snapshot = session.market.snapshot("BTCUSDT").await.unwrap();
        assert!(snapshot.closes.len() >= 10);
        assert_eq!(snapshot.closes.len(), snapshot.ema_fast.len());
        assert!(snapshot.atr > 0.0);
        assert!(session.venue.price("BTCUSDT").unwrap() > 0.0);
    }
}
