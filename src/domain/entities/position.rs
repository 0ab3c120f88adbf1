use crate::domain::entities::order::OrderSide;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The market order side that flattens a position on this side.
    pub fn closing_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    pub fn from_order_side(side: OrderSide) -> PositionSide {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Read-only view of a position as the venue reports it.
///
/// The venue owns this state; the engine only reads it and requests stop
/// amendments. Venues report absent protective levels as 0.0; the
/// constructor maps those to `None`.
#[derive(Debug, Clone)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: PositionSide,
    /// Contract magnitude. Zero means the slot is flat and is skipped.
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl VenuePosition {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Self {
        VenuePosition {
            symbol: symbol.into(),
            side,
            size,
            stop_loss: level_or_none(stop_loss),
            take_profit: level_or_none(take_profit),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }
}

fn level_or_none(level: f64) -> Option<f64> {
    if level > 0.0 && level.is_finite() {
        Some(level)
    } else {
        None
    }
}
