//! Stop-aware delays

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleeps for `delay` unless `stop` fires first
///
/// Returns `false` when the sleep was cut short by a stop request.
pub async fn pause(delay: Duration, stop: &CancellationToken) -> bool {
    if stop.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }

    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
