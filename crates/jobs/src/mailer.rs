//! SMTP mailer
//!
//! Jobs send through the [`MailTransport`] trait so reminder and campaign
//! logic can run against an in-memory transport in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use vodum_shared::{Settings, SmtpSettings};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Could not build message: {0}")]
    Build(String),

    #[error("Attachment {path} unreadable: {reason}")]
    Attachment { path: String, reason: String },

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// A single HTML message to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<PathBuf>,
}

impl OutgoingMail {
    pub fn html(to: &str, subject: &str, html_body: &str) -> Self {
        Self {
            to: to.trim().to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, path: Option<&str>) -> Self {
        self.attachment = path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        self
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// STARTTLS SMTP transport built from the settings row
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_settings(settings: &Settings) -> Result<Self, MailError> {
        let smtp = settings
            .smtp()
            .map_err(|e| MailError::NotConfigured(e.to_string()))?;
        Self::new(&smtp)
    }

    pub fn new(smtp: &SmtpSettings) -> Result<Self, MailError> {
        let from = parse_mailbox(&smtp.from)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| MailError::Smtp(e.to_string()))?
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.password.clone()))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(&self.from, mail).await?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        tracing::debug!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

async fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, MailError> {
    let builder = Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.clone());

    let message = match &mail.attachment {
        None => builder
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body.clone()),
        Some(path) => {
            let attachment = read_attachment(path).await?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(mail.html_body.clone()))
                    .singlepart(attachment),
            )
        }
    };

    message.map_err(|e| MailError::Build(e.to_string()))
}

async fn read_attachment(path: &Path) -> Result<SinglePart, MailError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MailError::Attachment {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| MailError::Build(e.to_string()))?;

    Ok(Attachment::new(filename).body(bytes, content_type))
}
