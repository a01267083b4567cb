//! Periodic removal of authorization codes and OAuth2 tokens past their
//! expiry plus a retention grace period.

use crate::error::StoreError;
use crate::store::{ExpiredCounts, GrantStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(ExpiredCounts),
    /// A previous sweep was still running.
    Skipped,
}

pub struct ExpiryReclaimer {
    grants: Arc<dyn GrantStore>,
    grace: time::Duration,
    running: AtomicBool,
}

/// Clears the running flag on every exit path, including cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExpiryReclaimer {
    pub fn new(grants: Arc<dyn GrantStore>, grace: time::Duration) -> Self {
        Self {
            grants,
            grace,
            running: AtomicBool::new(false),
        }
    }

    pub async fn sweep(&self) -> Result<SweepOutcome, StoreError> {
        self.sweep_at(crate::store::now_utc()).await
    }

    /// Deletes rows with `expires_at < now - grace` in one transaction.
    /// Only already-expired rows qualify, so live traffic is never affected.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_at(&self, now: OffsetDateTime) -> Result<SweepOutcome, StoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous expiry sweep still running, skipping");
            return Ok(SweepOutcome::Skipped);
        }
        let _guard = RunningGuard(&self.running);

        let cutoff = now
            .checked_sub(self.grace)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let counts = self.grants.delete_expired(cutoff).await?;
        Ok(SweepOutcome::Completed(counts))
    }

    /// Runs [`Self::sweep`] every `interval` until the runtime shuts down.
    /// A failed sweep is logged and retried on the next tick.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(SweepOutcome::Completed(counts)) if counts.total() > 0 => {
                        info!(
                            authorization_codes = counts.authorization_codes,
                            access_tokens = counts.access_tokens,
                            refresh_tokens = counts.refresh_tokens,
                            "Reclaimed expired grants"
                        );
                    }
                    Ok(_) => debug!("Expiry sweep found nothing to reclaim"),
                    Err(e) => warn!(error = %e, "Expiry sweep failed, will retry next tick"),
                }
            }
        })
    }
}
