//! Error taxonomy for the execution engine.
//!
//! Components return `Result<T, EngineError>` rather than throwing across
//! boundaries; only genuinely unexpected failures are boxed into `anyhow::Error`
//! at the process edge (main, scheduler supervisors) for top-level logging.

use thiserror::Error;

/// Coarse classification used by call sites that need to branch on kind
/// without matching every variant (HTTP status mapping, retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    ExchangeTemporary,
    ExchangePermanent,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unknown strategy group: {0}")]
    UnknownStrategy(String),

    #[error("bad webhook token")]
    BadToken,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("exchange temporary failure on {exchange}: {message}")]
    ExchangeTemporary { exchange: String, message: String },

    #[error("exchange permanent failure on {exchange}: {message}")]
    ExchangePermanent { exchange: String, message: String },

    #[error("cache miss on order path for {exchange}/{symbol}")]
    CacheMissOnOrderPath { exchange: String, symbol: String },

    /// A cancel targeted the wrong `market_type`: the exchange reported
    /// `OrderNotFound` on the first attempt, but a defensive re-fetch found
    /// the order alive on the other market type (seed scenario 4).
    #[error("order {order_id} lives on a different market_type than requested")]
    MarketTypeMismatch { order_id: String },

    #[error("retry exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("invariant violation: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::UnknownStrategy(_) | EngineError::BadToken => ErrorKind::Auth,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::ExchangeTemporary { .. } => ErrorKind::ExchangeTemporary,
            EngineError::ExchangePermanent { .. } => ErrorKind::ExchangePermanent,
            EngineError::CacheMissOnOrderPath { .. }
            | EngineError::MarketTypeMismatch { .. }
            | EngineError::RetryExhausted { .. }
            | EngineError::Internal(_) => ErrorKind::Internal,
            EngineError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Maps a unique-constraint violation on `Trade` to a benign duplicate,
    /// distinguishing it from every other database error.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, EngineError::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_validation() {
        let e = EngineError::Validation("bad symbol".into());
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn kind_maps_auth() {
        assert_eq!(EngineError::BadToken.kind(), ErrorKind::Auth);
        assert_eq!(
            EngineError::UnknownStrategy("g1".into()).kind(),
            ErrorKind::Auth
        );
    }

    #[test]
    fn kind_maps_exchange_buckets() {
        let temp = EngineError::ExchangeTemporary {
            exchange: "binance".into(),
            message: "timeout".into(),
        };
        assert_eq!(temp.kind(), ErrorKind::ExchangeTemporary);

        let perm = EngineError::ExchangePermanent {
            exchange: "binance".into(),
            message: "insufficient balance".into(),
        };
        assert_eq!(perm.kind(), ErrorKind::ExchangePermanent);
    }
}
