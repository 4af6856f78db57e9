//! Engine error taxonomy.
//!
//! Only [`EngineError::FutureMonth`] is fatal; tier I/O failures are caught at
//! the orchestrator boundary and degrade to the best locally available data.

use crate::models::MonthRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed request, rejected before any I/O.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Queried month lies after the current month. Indicates a correctness
    /// violation in the caller's own clock or state; terminates the session.
    #[error("queried month {queried} is after current month {current}")]
    FutureMonth { queried: MonthRef, current: MonthRef },

    /// Local store I/O failure.
    #[error("local store failure: {0}")]
    Store(anyhow::Error),

    /// Authoritative source I/O failure.
    #[error("remote source failure: {0}")]
    Remote(anyhow::Error),

    /// Fast-cache tier I/O failure.
    #[error("fast cache failure: {0}")]
    FastCache(anyhow::Error),
}

impl EngineError {
    /// Fatal errors must propagate to terminate the caller's session;
    /// everything else is recoverable or degradable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::FutureMonth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_future_month_is_fatal() {
        let fatal = EngineError::FutureMonth {
            queried: MonthRef::new(2026, 9),
            current: MonthRef::new(2026, 8),
        };
        assert!(fatal.is_fatal());
        assert!(!EngineError::Validation("bad id".into()).is_fatal());
        assert!(!EngineError::Remote(anyhow::anyhow!("timeout")).is_fatal());
    }
}
