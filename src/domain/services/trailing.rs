//! Trailing SL/TP adjustment (pure functions).
//!
//! Recomputes a position's protective levels from current market state and
//! the previous levels. No hidden state: all required history arrives as
//! explicit inputs, so the function can be exercised exhaustively without a
//! live venue.
//!
//! Invariants for a long position (shorts mirror):
//! - the take-profit never decreases across calls;
//! - the stop-loss only moves up or stays, and only moves when the
//!   improvement clears a profit-scaled anti-chatter step;
//! - neither level is left where the venue would trigger it instantly
//!   against the current mark price.

use crate::domain::entities::position::PositionSide;

/// Tunables for the trailing adjustment.
#[derive(Debug, Clone, Copy)]
pub struct TrailingTunables {
    /// ATR multiple the stop trails behind the close.
    pub trail_atr_factor: f64,
    /// ATR multiple the target leads ahead of the close.
    pub tp_atr_factor: f64,
    /// Base anti-chatter step, in ATR units.
    pub step_threshold: f64,
    /// Relative offset applied when a level must be pushed off the mark
    /// price (0.001 = 0.1%).
    pub clamp_pct: f64,
}

impl Default for TrailingTunables {
    fn default() -> Self {
        TrailingTunables {
            trail_atr_factor: 1.0,
            tp_atr_factor: 2.0,
            step_threshold: 0.3,
            clamp_pct: 0.001,
        }
    }
}

/// Market state and previous levels for one adjustment call.
///
/// Previous levels are `None` when the venue reports no protective order
/// yet; the freshly computed candidate then stands without comparison.
#[derive(Debug, Clone, Copy)]
pub struct TrailingInput {
    pub side: PositionSide,
    pub close: f64,
    pub prev_stop_loss: Option<f64>,
    pub prev_take_profit: Option<f64>,
    pub mark_price: f64,
    pub atr: f64,
    pub ema_fast: f64,
}

/// Adjustment result. The clamp flags record that a level had to be pushed
/// off the mark price; callers log these for audit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub clamped_stop_loss: bool,
    pub clamped_take_profit: bool,
}

/// Recompute SL/TP from the current close, ATR, fast EMA and mark price.
pub fn adjust_levels(input: &TrailingInput, tunables: &TrailingTunables) -> TrailingLevels {
    let dynamic_step = tunables.step_threshold * 1f64.max(profit_estimate(input).abs() * 10.0);

    let (mut stop_loss, mut take_profit) = match input.side {
        PositionSide::Long => long_levels(input, tunables, dynamic_step),
        PositionSide::Short => short_levels(input, tunables, dynamic_step),
    };

    let mut clamped_stop_loss = false;
    let mut clamped_take_profit = false;
    match input.side {
        PositionSide::Long => {
            if stop_loss >= input.mark_price {
                stop_loss = input.mark_price * (1.0 - tunables.clamp_pct);
                clamped_stop_loss = true;
            }
            if take_profit <= input.mark_price {
                take_profit = input.mark_price * (1.0 + tunables.clamp_pct);
                clamped_take_profit = true;
            }
        }
        PositionSide::Short => {
            if stop_loss <= input.mark_price {
                stop_loss = input.mark_price * (1.0 + tunables.clamp_pct);
                clamped_stop_loss = true;
            }
            if take_profit >= input.mark_price {
                take_profit = input.mark_price * (1.0 - tunables.clamp_pct);
                clamped_take_profit = true;
            }
        }
    }

    TrailingLevels {
        stop_loss,
        take_profit,
        clamped_stop_loss,
        clamped_take_profit,
    }
}

/// Unrealized-profit fraction against a baseline two ATRs under the
/// previous target. A baseline that is absent, non-positive or non-finite
/// yields 0, so the dynamic step falls back to its floor instead of
/// dividing by a vanishing denominator.
fn profit_estimate(input: &TrailingInput) -> f64 {
    match input.prev_take_profit {
        Some(prev_tp) => {
            let baseline = prev_tp - 2.0 * input.atr;
            if baseline > 0.0 && baseline.is_finite() {
                (input.close - baseline) / baseline
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

fn long_levels(
    input: &TrailingInput,
    tunables: &TrailingTunables,
    dynamic_step: f64,
) -> (f64, f64) {
    let tp_candidate = input.close + input.atr * tunables.tp_atr_factor;
    let take_profit = match input.prev_take_profit {
        // Close ran past the old target: re-anchor above the close
        Some(prev_tp) if input.close > prev_tp => tp_candidate,
        Some(prev_tp) => prev_tp.max(tp_candidate),
        None => tp_candidate,
    };

    let sl_candidate = (input.close - input.atr * tunables.trail_atr_factor).max(input.ema_fast);
    let stop_loss = match input.prev_stop_loss {
        Some(prev_sl)
            if sl_candidate > prev_sl && sl_candidate - prev_sl > input.atr * dynamic_step =>
        {
            sl_candidate
        }
        Some(prev_sl) => prev_sl,
        None => sl_candidate,
    };

    (stop_loss, take_profit)
}

fn short_levels(
    input: &TrailingInput,
    tunables: &TrailingTunables,
    dynamic_step: f64,
) -> (f64, f64) {
    let tp_candidate = input.close - input.atr * tunables.tp_atr_factor;
    let take_profit = match input.prev_take_profit {
        Some(prev_tp) if input.close < prev_tp => tp_candidate,
        Some(prev_tp) => prev_tp.min(tp_candidate),
        None => tp_candidate,
    };

    let sl_candidate = (input.close + input.atr * tunables.trail_atr_factor).min(input.ema_fast);
    let stop_loss = match input.prev_stop_loss {
        Some(prev_sl)
            if sl_candidate < prev_sl && prev_sl - sl_candidate > input.atr * dynamic_step =>
        {
            sl_candidate
        }
        Some(prev_sl) => prev_sl,
        None => sl_candidate,
    };

    (stop_loss, take_profit)
}
