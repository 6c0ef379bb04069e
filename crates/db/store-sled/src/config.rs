use std::{thread, time::Duration};

use satfund_db_types::{DbError, DbResult};
use sled::{
    transaction::{ConflictableTransactionResult, TransactionError},
    Transactional,
};
use tracing::warn;

use crate::utils::to_db_error;

// Configuration constants
pub(crate) const DEFAULT_RETRY_COUNT: u16 = 3;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 150;
pub(crate) const TEST_RETRY_DELAY_MS: u64 = 10; // Faster for tests

/// database operations configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SledDbConfig {
    pub retry_count: u16,
    pub retry_delay_ms: u64,
}

impl SledDbConfig {
    pub fn new(retry_count: u16, retry_delay_ms: u64) -> Self {
        Self {
            retry_count,
            retry_delay_ms,
        }
    }

    /// Create production configuration with default values
    pub fn production() -> Self {
        Self::new(DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS)
    }

    /// Create test configuration with faster retry delays
    pub fn test() -> Self {
        Self::new(DEFAULT_RETRY_COUNT, TEST_RETRY_DELAY_MS)
    }

    /// Runs `f` as one sled transaction over `trees`.
    ///
    /// Write conflicts between concurrent transactions are resolved by sled
    /// itself by re-running the closure. Storage failures are retried here up
    /// to `retry_count` times. An abort returns its [`DbError`] unchanged and
    /// leaves every tree untouched.
    pub fn with_retry<T, F, R>(&self, trees: T, f: F) -> DbResult<R>
    where
        T: Transactional<DbError>,
        F: Fn(&T::View) -> ConflictableTransactionResult<R, DbError>,
    {
        let mut attempt: u16 = 0;
        loop {
            match trees.transaction(|view| f(view)) {
                Ok(res) => return Ok(res),
                Err(TransactionError::Abort(err)) => return Err(err),
                Err(TransactionError::Storage(err)) if attempt < self.retry_count => {
                    attempt += 1;
                    warn!(%err, %attempt, "sled transaction failed, retrying");
                    thread::sleep(Duration::from_millis(self.retry_delay_ms));
                }
                Err(TransactionError::Storage(err)) => return Err(to_db_error(err)),
            }
        }
    }
}

impl Default for SledDbConfig {
    fn default() -> Self {
        Self::production()
    }
}
