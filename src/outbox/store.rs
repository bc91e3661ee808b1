use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::outbox::job::{EmailJob, JobStatus, NewEmail};

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence operations for the email outbox.
///
/// `claim_next` is the durability boundary: the returned job has already
/// been moved to `processing` before any delivery is attempted, so a crash
/// mid-delivery leaves a visible `processing` row instead of a silently
/// re-runnable one.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(&self, email: NewEmail) -> Result<Uuid, OutboxError>;

    /// Atomically claim the oldest due pending job, marking it `processing`.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<EmailJob>, OutboxError>;

    async fn mark_completed(&self, id: Uuid) -> Result<(), OutboxError>;

    async fn mark_retry(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), OutboxError>;

    async fn mark_failed(&self, id: Uuid, attempts: i32, error: &str) -> Result<(), OutboxError>;
}

/// Outbox store backed by the central database.
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn enqueue(&self, email: NewEmail) -> Result<Uuid, OutboxError> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO email_jobs
                (to_address, subject, body_text, body_html, attachments, smtp_override)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(email.to)
        .bind(email.subject)
        .bind(email.text)
        .bind(email.html)
        .bind(Json(email.attachments))
        .bind(email.smtp_override.map(Json))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<EmailJob>, OutboxError> {
        // Oldest-created-first among due pending jobs; SKIP LOCKED keeps a
        // concurrent claimer from blocking on the same row.
        let job = sqlx::query_as::<_, EmailJob>(
            r#"
            UPDATE email_jobs
            SET status = $1
            WHERE id = (
                SELECT id FROM email_jobs
                WHERE status = $2 AND next_attempt_at <= $3
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(JobStatus::Processing.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<(), OutboxError> {
        sqlx::query("UPDATE email_jobs SET status = $2, last_error = NULL WHERE id = $1")
            .bind(id)
            .bind(JobStatus::Completed.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), OutboxError> {
        sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, attempts = $3, last_error = $4, next_attempt_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(JobStatus::Pending.as_str())
        .bind(attempts)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, attempts: i32, error: &str) -> Result<(), OutboxError> {
        sqlx::query(
            "UPDATE email_jobs SET status = $2, attempts = $3, last_error = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Failed.as_str())
        .bind(attempts)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
