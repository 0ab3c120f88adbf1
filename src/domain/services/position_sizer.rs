//! Position sizing service.
//!
//! Converts account balance, signal confidence and current volatility into
//! a position size, and interpolates leverage from confidence.

/// PositionSizer service for confidence- and volatility-aware sizing
#[derive(Debug, Clone, Default)]
pub struct PositionSizer;

impl PositionSizer {
    pub fn new() -> Self {
        Self
    }

    /// Size a position in base-currency units.
    ///
    /// risk_amount = balance * risk_pct * confidence, capped by volatility
    /// at risk_amount / (atr * 3). The capped risk divided by price gives
    /// the size, rounded to 8 decimal places.
    ///
    /// Returns 0.0 when price or ATR is non-positive; neither is ever used
    /// as a divisor in that case.
    pub fn size(
        &self,
        balance: f64,
        confidence: f64,
        price: f64,
        atr: f64,
        risk_pct: f64,
    ) -> f64 {
        if price <= 0.0 || atr <= 0.0 {
            return 0.0;
        }

        let risk_amount = balance * risk_pct * confidence;
        let atr_adjusted_risk = (risk_amount / (atr * 3.0)).min(risk_amount);

        round_dp(atr_adjusted_risk / price, 8)
    }

    /// Leverage for a confidence level, linearly interpolated over
    /// [min_leverage, max_leverage] and rounded to 2 decimals.
    ///
    /// Confidence outside [0, 1] extrapolates; the signal provider owns the
    /// range contract.
    pub fn leverage(&self, confidence: f64, min_leverage: f64, max_leverage: f64) -> f64 {
        round_dp(min_leverage + (max_leverage - min_leverage) * confidence, 2)
    }
}

fn round_dp(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_worked_example() {
        // balance 10000, confidence 0.8, price 100, atr 2, risk 1%:
        // risk = 80, capped = min(80/6, 80) = 13.3333..., size = 0.13333333
        let sizer = PositionSizer::new();
        let size = sizer.size(10_000.0, 0.8, 100.0, 2.0, 0.01);
        assert_eq!(size, 0.13333333);
    }

    #[test]
    fn test_size_zero_on_bad_price_or_atr() {
        let sizer = PositionSizer::new();
        assert_eq!(sizer.size(10_000.0, 0.8, 0.0, 2.0, 0.01), 0.0);
        assert_eq!(sizer.size(10_000.0, 0.8, -5.0, 2.0, 0.01), 0.0);
        assert_eq!(sizer.size(10_000.0, 0.8, 100.0, 0.0, 0.01), 0.0);
        assert_eq!(sizer.size(10_000.0, 0.8, 100.0, -1.0, 0.01), 0.0);
    }

    #[test]
    fn test_size_non_negative_and_monotonic_in_balance() {
        let sizer = PositionSizer::new();
        let mut prev = 0.0;
        for balance in [0.0, 100.0, 1_000.0, 10_000.0, 100_000.0] {
            let size = sizer.size(balance, 0.5, 250.0, 4.0, 0.01);
            assert!(size >= prev, "size must not shrink as balance grows");
            prev = size;
        }
    }

    #[test]
    fn test_size_monotonic_in_confidence() {
        let sizer = PositionSizer::new();
        let mut prev = 0.0;
        for confidence in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let size = sizer.size(10_000.0, confidence, 250.0, 4.0, 0.01);
            assert!(size >= prev, "size must not shrink as confidence grows");
            prev = size;
        }
    }

    #[test]
    fn test_size_cap_inactive_for_small_atr() {
        // atr = 0.1 -> risk/(atr*3) exceeds risk, so the plain risk amount
        // stands: size = 100 / 100
        let sizer = PositionSizer::new();
        let size = sizer.size(10_000.0, 1.0, 100.0, 0.1, 0.01);
        assert_eq!(size, 1.0);
    }

    #[test]
    fn test_leverage_endpoints_and_affinity() {
        let sizer = PositionSizer::new();
        assert_eq!(sizer.leverage(0.0, 2.0, 25.0), 2.0);
        assert_eq!(sizer.leverage(1.0, 2.0, 25.0), 25.0);
        // Affine: value at 0.5 is the midpoint
        assert_eq!(sizer.leverage(0.5, 2.0, 25.0), 13.5);
    }

    #[test]
    fn test_leverage_extrapolates_outside_unit_interval() {
        let sizer = PositionSizer::new();
        assert_eq!(sizer.leverage(1.2, 2.0, 12.0), 14.0);
        assert_eq!(sizer.leverage(-0.1, 2.0, 12.0), 1.0);
    }

    #[test]
    fn test_leverage_rounds_to_two_decimals() {
        let sizer = PositionSizer::new();
        assert_eq!(sizer.leverage(1.0 / 3.0, 2.0, 25.0), 9.67);
    }
}
