use crate::domain::entities::order::OrderSide;

/// Last trade and mark price for a symbol.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub last: f64,
    /// Venue mark price; trigger orders fire against this, so the trailing
    /// safety clamp compares against it rather than `last`.
    pub mark_price: f64,
}

/// Short-timeframe market state handed to the engine by the indicator
/// collaborator. The engine never computes indicators itself; it consumes
/// the latest close, ATR and fast-EMA values plus enough closed-bar history
/// for the adverse-close exit check.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    /// Recent closes, oldest first. The last element is the current close.
    pub closes: Vec<f64>,
    /// Fast EMA per bar, aligned with `closes`.
    pub ema_fast: Vec<f64>,
    pub atr: f64,
}

impl MarketSnapshot {
    pub fn close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    pub fn last_ema_fast(&self) -> Option<f64> {
        self.ema_fast.last().copied()
    }
}

/// A directional signal from the classification collaborator.
#[derive(Debug, Clone, Copy)]
pub struct TradeSignal {
    pub side: OrderSide,
    /// Model confidence in [0, 1]. The sizing math assumes this range;
    /// the signal provider is responsible for supplying it.
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accessors() {
        let snap = MarketSnapshot {
            closes: vec![100.0, 101.0, 102.0],
            ema_fast: vec![99.0, 100.0, 100.5],
            atr: 2.0,
        };
        assert_eq!(snap.close(), Some(102.0));
        assert_eq!(snap.last_ema_fast(), Some(100.5));
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = MarketSnapshot {
            closes: vec![],
            ema_fast: vec![],
            atr: 0.0,
        };
        assert!(snap.close().is_none());
        assert!(snap.last_ema_fast().is_none());
    }
}
