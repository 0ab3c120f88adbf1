//! Venue Client Trait
//!
//! Common interface over the trading venue. The engine talks to the venue
//! only through this trait, which keeps the lifecycle logic independent of
//! any wire protocol and lets tests substitute deterministic doubles for
//! retry, rejection and reconciliation scenarios.

use crate::domain::entities::order::{ClosedOrder, OrderReceipt, OrderRequest};
use crate::domain::entities::market::Ticker;
use crate::domain::entities::position::VenuePosition;
use crate::domain::errors::VenueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type VenueResult<T> = Result<T, VenueError>;

/// Outcome of a stop-amendment request.
///
/// Venues distinguish "levels updated" from "request valid but nothing
/// changed"; only the former belongs in the amendment audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendAck {
    Applied,
    NoChange,
}

#[async_trait]
pub trait VenueClient: Send + Sync {
    fn name(&self) -> &str;

    /// Total account balance in the settlement currency.
    async fn fetch_balance(&self) -> VenueResult<f64>;

    /// All position slots the venue reports, flat ones included.
    async fn fetch_positions(&self) -> VenueResult<Vec<VenuePosition>>;

    async fn fetch_ticker(&self, symbol: &str) -> VenueResult<Ticker>;

    /// Submit an order, with any attached bracket levels registered as
    /// venue-side trigger orders.
    async fn create_order(&self, request: &OrderRequest) -> VenueResult<OrderReceipt>;

    /// Replace the protective stop levels on an open position.
    async fn amend_position_stops(
        &self,
        symbol: &str,
        stop_loss: f64,
        take_profit: f64,
    ) -> VenueResult<AmendAck>;

    /// Closed-order history for a symbol since the given instant.
    async fn fetch_closed_orders(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> VenueResult<Vec<ClosedOrder>>;
}
