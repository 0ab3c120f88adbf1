//! Bracket order computation and submission.
//!
//! Protective SL/TP offsets are derived from the current ATR, floored
//! against percentage-of-entry policy minimums, validated, and submitted
//! together with the entry order as venue-side triggers. Transient
//! transport failures are retried a bounded number of times; venue-level
//! rejections abort immediately.

use crate::domain::entities::order::{BracketLevels, OrderReceipt, OrderRequest, OrderSide};
use crate::domain::errors::{EngineError, VenueError};
use crate::domain::repositories::venue_client::VenueClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Policy constants governing bracket placement.
#[derive(Debug, Clone, Copy)]
pub struct BracketPolicy {
    /// ATR multiple for the raw stop distance.
    pub stop_atr_mult: f64,
    /// Reward-to-risk ratio applied on top of the stop distance.
    pub reward_risk_ratio: f64,
    /// The stop is never placed tighter than this fraction of entry.
    pub min_stop_pct: f64,
    /// The target is never placed closer than this fraction of entry.
    pub default_tp_pct: f64,
}

impl Default for BracketPolicy {
    fn default() -> Self {
        BracketPolicy {
            stop_atr_mult: 1.5,
            reward_risk_ratio: 2.0,
            min_stop_pct: 0.005,
            default_tp_pct: 0.10,
        }
    }
}

/// Bounded retry for transient submission failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Compute SL/TP levels for an entry at `entry` with volatility `atr`.
///
/// The stop takes the more conservative of the ATR stop and the
/// percentage-of-entry floor (the candidate closer to entry, i.e. the
/// smaller loss). The target takes the more generous of the ATR target and
/// the percentage-of-entry default. A target that fails to clear the entry
/// on the correct side is a validation error; nothing is submitted.
pub fn compute_levels(
    symbol: &str,
    side: OrderSide,
    entry: f64,
    atr: f64,
    policy: &BracketPolicy,
) -> Result<BracketLevels, EngineError> {
    let (stop_loss, take_profit) = match side {
        OrderSide::Buy => {
            let sl = (entry - atr * policy.stop_atr_mult).max(entry * (1.0 - policy.min_stop_pct));
            let tp = (entry + atr * policy.reward_risk_ratio * policy.stop_atr_mult)
                .max(entry * (1.0 + policy.default_tp_pct));
            if tp <= entry {
                return Err(EngineError::InvalidBracket {
                    symbol: symbol.to_string(),
                    reason: format!("TP {tp} must be > entry {entry} for buy"),
                });
            }
            (sl, tp)
        }
        OrderSide::Sell => {
            let sl = (entry + atr * policy.stop_atr_mult).min(entry * (1.0 + policy.min_stop_pct));
            let tp = (entry - atr * policy.reward_risk_ratio * policy.stop_atr_mult)
                .min(entry * (1.0 - policy.default_tp_pct));
            if tp >= entry {
                return Err(EngineError::InvalidBracket {
                    symbol: symbol.to_string(),
                    reason: format!("TP {tp} must be < entry {entry} for sell"),
                });
            }
            (sl, tp)
        }
    };

    Ok(BracketLevels {
        stop_loss,
        take_profit,
    })
}

/// Submits entry orders with attached protective triggers.
pub struct BracketOrderExecutor {
    venue: Arc<dyn VenueClient>,
    policy: BracketPolicy,
    retry: RetryPolicy,
}

impl BracketOrderExecutor {
    pub fn new(venue: Arc<dyn VenueClient>, policy: BracketPolicy, retry: RetryPolicy) -> Self {
        BracketOrderExecutor {
            venue,
            policy,
            retry,
        }
    }

    /// Place a market entry with computed SL/TP triggers attached.
    ///
    /// Every outcome is reported: success at info, retries at warn,
    /// rejection and exhaustion at error. An `Err` return means no position
    /// was opened.
    pub async fn place(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        entry_price: f64,
        atr: f64,
    ) -> Result<OrderReceipt, EngineError> {
        let levels = compute_levels(symbol, side, entry_price, atr, &self.policy)?;
        let request = OrderRequest::market(symbol, side, amount).with_bracket(levels);

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = VenueError::Network("no submission attempted".to_string());

        for attempt in 1..=max_attempts {
            match self.venue.create_order(&request).await {
                Ok(receipt) => {
                    info!(
                        "Bracket order placed: id={} {} {} amount={} SL={:.4} TP={:.4}",
                        receipt.order_id, side, symbol, amount, levels.stop_loss, levels.take_profit
                    );
                    return Ok(receipt);
                }
                Err(e) if e.is_transient() => {
                    warn!("[retry {attempt}/{max_attempts}] {symbol} order submission: {e}");
                    last_error = e;
                    if attempt < max_attempts {
                        sleep(self.retry.delay).await;
                    }
                }
                Err(e) => {
                    error!("{symbol} order rejected, not retrying: {e}");
                    return Err(e.into());
                }
            }
        }

        error!("Failed to place bracket order for {symbol} after {max_attempts} attempts");
        Err(EngineError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
