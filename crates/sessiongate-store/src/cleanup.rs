//! Periodic purge of expired refresh tokens
//!
//! Stores never spawn background work themselves. A caller that wants periodic
//! cleanup starts it here and owns both the [`JoinHandle`] and the
//! [`CancellationToken`] that stops it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::record::RefreshTokenStore;

/// Run [`RefreshTokenStore::cleanup`] every `period` until `shutdown` fires
///
/// The first purge happens one full period after the call. Failed purges are
/// logged and retried on the next tick.
///
/// # Errors
///
/// Returns [`StoreError::Configuration`] for a zero period.
pub fn spawn_cleanup(
    store: Arc<dyn RefreshTokenStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    if period.is_zero() {
        return Err(StoreError::Configuration(
            "cleanup period must be greater than zero".to_string(),
        ));
    }

    Ok(tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!(backend = %store.backend(), "Refresh token cleanup stopped");
                    break;
                }
                _ = interval.tick() => {
                    match store.cleanup().await {
                        Ok(purged) => debug!(purged, backend = %store.backend(), "Refresh token cleanup pass"),
                        Err(error) => warn!(error = %error, "Refresh token cleanup failed"),
                    }
                }
            }
        }
    }))
}
