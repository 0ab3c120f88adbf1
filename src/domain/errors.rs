use thiserror::Error;

/// Errors surfaced by the venue client capability boundary.
///
/// The split between `Network` and `Rejected` drives retry policy: network
/// failures are transient and retried with a fixed delay, venue rejections
/// are final and abort the attempted action immediately.
#[derive(Debug, Error, Clone)]
pub enum VenueError {
    /// Transport-level failure (timeout, connection reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The venue refused the request (risk checks, bad parameters, policy).
    #[error("rejected by venue: {0}")]
    Rejected(String),

    /// No such symbol / position on the venue.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Authentication or permission failure.
    #[error("authentication error: {0}")]
    Authentication(String),
}

impl VenueError {
    /// Transient failures are worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Network(_))
    }
}

/// Errors from the market-data / signal collaborators.
#[derive(Debug, Error, Clone)]
pub enum MarketDataError {
    #[error("no market data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient history for {symbol}: need {required}, have {available}")]
    InsufficientHistory {
        symbol: String,
        required: usize,
        available: usize,
    },

    #[error("feed error: {0}")]
    Feed(String),
}

/// Errors raised while driving the position lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Computed take-profit does not clear the entry on the correct side.
    /// Caught before any network call is made.
    #[error("invalid bracket for {symbol}: {reason}")]
    InvalidBracket { symbol: String, reason: String },

    /// Transient venue failures exhausted the retry budget.
    #[error("order submission failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: VenueError },

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error("ledger error: {0}")]
    Ledger(#[from] crate::persistence::LedgerError),
}
