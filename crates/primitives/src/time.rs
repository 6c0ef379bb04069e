//! Wall-clock access and conversion of calendar times into lock times.

use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::absolute::{self, LOCK_TIME_THRESHOLD};

use crate::errors::LockTimeError;

/// Source of the current wall-clock time, in unix seconds.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Converts a unix timestamp into a time-based absolute lock time.
///
/// Timestamps below [`LOCK_TIME_THRESHOLD`] would be read as block heights, so
/// they are rejected rather than silently changing meaning.
pub fn to_network_lock_time(unix_secs: u64) -> Result<absolute::LockTime, LockTimeError> {
    if unix_secs < LOCK_TIME_THRESHOLD as u64 {
        return Err(LockTimeError::BelowThreshold(unix_secs));
    }
    let secs = u32::try_from(unix_secs).map_err(|_| LockTimeError::Overflow(unix_secs))?;
    absolute::LockTime::from_time(secs).map_err(|_| LockTimeError::BelowThreshold(unix_secs))
}
