//! Adverse-close exit check.
//!
//! A position is force-closed when every one of the last `window` closes
//! lands on the adverse side of the fast EMA. This is a streak requirement:
//! a single favorable bar inside the window resets the signal.

use crate::domain::entities::position::PositionSide;

/// True when the last `window` closes are all adverse to the fast EMA
/// (below it for a long, above it for a short).
///
/// `closes` and `ema_fast` are aligned, oldest first. With fewer than
/// `window` bars of history there is no signal.
pub fn should_exit(side: PositionSide, closes: &[f64], ema_fast: &[f64], window: usize) -> bool {
    if window == 0 || closes.len() < window || ema_fast.len() < window {
        return false;
    }

    let closes = &closes[closes.len() - window..];
    let ema_fast = &ema_fast[ema_fast.len() - window..];

    let adverse = closes
        .iter()
        .zip(ema_fast)
        .filter(|(close, ema)| match side {
            PositionSide::Long => close < ema,
            PositionSide::Short => close > ema,
        })
        .count();

    adverse == window
}
