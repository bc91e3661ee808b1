use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SmtpSettings;
use crate::outbox::job::SmtpConfig;
use crate::outbox::mailer::Mailer;
use crate::outbox::store::OutboxStore;

/// What to do with a job after a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    GiveUp,
}

/// Fixed retry budget with fixed (non-exponential) backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &SmtpSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: Duration::from_secs(settings.retry_backoff_secs),
        }
    }

    /// `failed_attempts` is the counter AFTER the failure being handled.
    pub fn disposition(&self, failed_attempts: i32) -> Disposition {
        if failed_attempts < self.max_attempts {
            Disposition::Retry
        } else {
            Disposition::GiveUp
        }
    }
}

/// Outcome of a single worker tick, mainly for tests and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No due pending job existed.
    Idle,
    /// A previous tick was still in flight; this tick did nothing.
    SkippedBusy,
    Delivered(Uuid),
    Retried(Uuid),
    Failed(Uuid),
}

/// Polling worker draining the email outbox, one job per tick.
///
/// A single worker process is assumed; the in-flight flag only prevents
/// overlapping ticks within this process, not duplicate delivery across
/// processes.
pub struct OutboxWorker<S, M> {
    store: S,
    mailer: M,
    default_transport: SmtpConfig,
    policy: RetryPolicy,
    poll_interval: Duration,
    in_flight: AtomicBool,
}

impl<S, M> OutboxWorker<S, M>
where
    S: OutboxStore + Send + Sync + 'static,
    M: Mailer + Send + Sync + 'static,
{
    pub fn new(store: S, mailer: M, settings: &SmtpSettings) -> Self {
        Self {
            store,
            mailer,
            default_transport: settings.default_transport.clone(),
            policy: RetryPolicy::from_settings(settings),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Outbox worker started (poll every {:?}, {} attempts max)",
                self.poll_interval, self.policy.max_attempts
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    /// One claim-and-process cycle. Skips entirely when a previous cycle is
    /// still running.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TickOutcome::SkippedBusy;
        }

        let outcome = self.process_next().await;
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    async fn process_next(&self) -> TickOutcome {
        let job = match self.store.claim_next(Utc::now()).await {
            Ok(Some(job)) => job,
            Ok(None) => return TickOutcome::Idle,
            Err(err) => {
                error!("Outbox claim failed: {}", err);
                return TickOutcome::Idle;
            }
        };

        debug!(
            "Processing email job {} to {} ({} failed attempts so far)",
            job.id, job.to_address, job.attempts
        );

        let config = job
            .smtp_override
            .as_ref()
            .map(|o| o.0.clone())
            .unwrap_or_else(|| self.default_transport.clone());

        match self.mailer.send(&job, &config).await {
            Ok(()) => {
                if let Err(err) = self.store.mark_completed(job.id).await {
                    error!("Failed to mark job {} completed: {}", job.id, err);
                }
                info!("Delivered email job {} to {}", job.id, job.to_address);
                TickOutcome::Delivered(job.id)
            }
            Err(send_err) => {
                let attempts = job.attempts + 1;
                warn!(
                    "Email job {} delivery failed (attempt {}): {}",
                    job.id, attempts, send_err
                );

                match self.policy.disposition(attempts) {
                    Disposition::Retry => {
                        let next = Utc::now()
                            + chrono::Duration::from_std(self.policy.backoff)
                                .unwrap_or_else(|_| chrono::Duration::seconds(300));
                        if let Err(err) = self
                            .store
                            .mark_retry(job.id, attempts, &send_err.to_string(), next)
                            .await
                        {
                            error!("Failed to reschedule job {}: {}", job.id, err);
                        }
                        TickOutcome::Retried(job.id)
                    }
                    Disposition::GiveUp => {
                        if let Err(err) = self
                            .store
                            .mark_failed(job.id, attempts, &send_err.to_string())
                            .await
                        {
                            error!("Failed to mark job {} failed: {}", job.id, err);
                        }
                        error!(
                            "Email job {} permanently failed after {} attempts",
                            job.id, attempts
                        );
                        TickOutcome::Failed(job.id)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(300),
        }
    }

    #[test]
    fn retries_until_budget_exhausted() {
        let policy = policy();
        assert_eq!(policy.disposition(1), Disposition::Retry);
        assert_eq!(policy.disposition(2), Disposition::Retry);
        assert_eq!(policy.disposition(3), Disposition::GiveUp);
        assert_eq!(policy.disposition(4), Disposition::GiveUp);
    }

    #[test]
    fn backoff_is_fixed() {
        let policy = policy();
        assert_eq!(policy.backoff, Duration::from_secs(300));
    }
}
