//! Single-shot degraded retry
//!
//! A failed operation is retried at most once, and only when its error is
//! recoverable; a recovery step (for saves: aggressive pruning) runs between
//! the two attempts. There is no backoff and no loop.

use crate::{Result, StoreError};
use tracing::{debug, error, warn};

/// Run `op`, and if attempt 1 fails with a recoverable error run `recover`
/// followed by attempt 2.
///
/// `op` receives the attempt number (1 or 2) so the second attempt can take a
/// cheaper path than the first. The error of the last attempt is returned.
pub fn with_degraded_retry<T, F, R>(op_name: &'static str, mut op: F, recover: R) -> Result<T>
where
    F: FnMut(usize) -> Result<T>,
    R: FnOnce(&StoreError),
{
    debug!("Attempting operation '{}' (attempt 1)", op_name);

    let first_err = match op(1) {
        Ok(result) => return Ok(result),
        Err(err) if err.is_recoverable() => err,
        Err(err) => {
            warn!("Operation '{}' failed permanently: {}", op_name, err);
            return Err(err);
        }
    };

    warn!(
        "Operation '{}' failed on attempt 1, retrying in degraded mode: {}",
        op_name, first_err
    );
    recover(&first_err);

    match op(2) {
        Ok(result) => {
            debug!("Operation '{}' succeeded after 2 attempts", op_name);
            Ok(result)
        }
        Err(err) => {
            error!("Operation '{}' failed after degraded retry: {}", op_name, err);
            Err(err)
        }
    }
}
