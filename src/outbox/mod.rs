// Durable email outbox: a persisted job table on the central database, a
// polling worker, and bounded retry. Enqueueing returns immediately;
// delivery happens asynchronously with at-least-once semantics.

pub mod job;
pub mod mailer;
pub mod store;
pub mod worker;

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

pub use job::{Attachment, AttachmentSource, EmailJob, JobStatus, NewEmail, SmtpConfig};
pub use mailer::{Mailer, MailerError, SmtpMailer};
pub use store::{OutboxError, OutboxStore, PgOutboxStore};
pub use worker::{OutboxWorker, RetryPolicy, TickOutcome};

/// Handle business code uses to queue outbound email. Every call creates a
/// distinct job; there is no deduplication.
#[derive(Clone)]
pub struct EmailOutbox {
    store: Arc<dyn OutboxStore>,
}

impl EmailOutbox {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Persist a pending job due immediately and return its id. Does not
    /// wait for delivery.
    pub async fn enqueue(&self, email: NewEmail) -> Result<Uuid, OutboxError> {
        let id = self.store.enqueue(email).await?;
        debug!("Queued email job {}", id);
        Ok(id)
    }
}
