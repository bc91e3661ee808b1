use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// SMTP transport parameters. Jobs may carry an override; otherwise the
/// system-wide default from configuration applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub username: String,
    pub password: String,
    pub from_name: String,
    pub from_address: String,
}

/// Delivery state of a queued email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AttachmentSource {
    /// Base64-encoded bytes stored with the job.
    Content { base64: String },
    /// Path on the worker host, read at delivery time.
    Path { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(flatten)]
    pub source: AttachmentSource,
}

/// A persisted email job. Rows are never deleted; completed and failed jobs
/// remain as the delivery history.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmailJob {
    pub id: Uuid,
    pub to_address: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub attachments: Json<Vec<Attachment>>,
    #[serde(skip_serializing)]
    pub smtp_override: Option<Json<SmtpConfig>>,
    pub status: String,
    /// Number of FAILED delivery tries so far; a first-try success completes
    /// with this still at zero.
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl EmailJob {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// A request to send an email, before it becomes a persisted job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub smtp_override: Option<SmtpConfig>,
}
