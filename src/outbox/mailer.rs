use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::outbox::job::{AttachmentSource, EmailJob, SmtpConfig};

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Message build failed: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Invalid content type: {0}")]
    ContentType(String),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Attachment read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Attachment decode failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// Delivery seam between the worker and the wire. Tests substitute scripted
/// implementations; production uses [`SmtpMailer`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, job: &EmailJob, config: &SmtpConfig) -> Result<(), MailerError>;
}

/// The connection tuple a transport is valid for. Consecutive jobs sharing
/// a tuple reuse the same transport; a differing tuple rebuilds it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransportKey {
    host: String,
    port: u16,
    username: String,
    secure: bool,
}

impl TransportKey {
    fn of(config: &SmtpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            secure: config.secure,
        }
    }
}

/// SMTP delivery via lettre, with a single cached transport keyed by the
/// connection tuple of the last job.
pub struct SmtpMailer {
    timeout: Duration,
    cached: Mutex<Option<(TransportKey, AsyncSmtpTransport<Tokio1Executor>)>>,
}

impl SmtpMailer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cached: Mutex::new(None),
        }
    }

    async fn transport_for(
        &self,
        config: &SmtpConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
        let key = TransportKey::of(config);
        let mut cached = self.cached.lock().await;

        if let Some((cached_key, transport)) = cached.as_ref() {
            if *cached_key == key {
                return Ok(transport.clone());
            }
        }

        let transport = Self::build_transport(config, self.timeout)?;
        *cached = Some((key, transport.clone()));
        Ok(transport)
    }

    fn build_transport(
        config: &SmtpConfig,
        timeout: Duration,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
        let mut builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port).timeout(Some(timeout));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(builder.build())
    }

    async fn build_message(job: &EmailJob, config: &SmtpConfig) -> Result<Message, MailerError> {
        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config.from_address.parse()?,
        );
        let to: Mailbox = job.to_address.parse()?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(job.subject.clone());

        let body = match &job.body_html {
            Some(html) => {
                MultiPart::alternative_plain_html(job.body_text.clone(), html.clone())
            }
            None => MultiPart::alternative().singlepart(SinglePart::plain(job.body_text.clone())),
        };

        if job.attachments.0.is_empty() {
            return Ok(builder.multipart(body)?);
        }

        let mut mixed = MultiPart::mixed().multipart(body);
        for attachment in job.attachments.0.iter() {
            let bytes = match &attachment.source {
                AttachmentSource::Content { base64 } => BASE64.decode(base64)?,
                AttachmentSource::Path { path } => tokio::fs::read(path).await?,
            };
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|err| MailerError::ContentType(err.to_string()))?;
            mixed = mixed.singlepart(
                MimeAttachment::new(attachment.filename.clone()).body(bytes, content_type),
            );
        }

        Ok(builder.multipart(mixed)?)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, job: &EmailJob, config: &SmtpConfig) -> Result<(), MailerError> {
        let message = Self::build_message(job, config).await?;
        let transport = self.transport_for(config).await?;

        match tokio::time::timeout(self.timeout, transport.send(message)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(MailerError::Timeout(self.timeout)),
        }
    }
}
