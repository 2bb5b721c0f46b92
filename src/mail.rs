//! Outgoing mail: message construction, the SMTP transport and admin notifications.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::{DefaultSenderConfig, MailConfig};
use crate::models::User;
use crate::services::email_bot_manager::SenderCredentials;

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("SMTP delivery failed: {0}")]
    Delivery(String),
}

/// Who a message is sent as, including the credentials for the SMTP relay.
pub struct SenderIdentity {
    pub email: String,
    pub password: Zeroizing<String>,
    pub from_name: Option<String>,
    pub smtp_server: String,
    pub smtp_port: u16,
}

impl fmt::Debug for SenderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderIdentity")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish_non_exhaustive()
    }
}

impl From<SenderCredentials> for SenderIdentity {
    fn from(creds: SenderCredentials) -> Self {
        Self {
            email: creds.sender_email,
            password: creds.app_password,
            from_name: creds.display_name,
            smtp_server: creds.smtp_server,
            smtp_port: creds.smtp_port,
        }
    }
}

impl From<&DefaultSenderConfig> for SenderIdentity {
    fn from(config: &DefaultSenderConfig) -> Self {
        Self {
            email: config.email.clone(),
            password: Zeroizing::new(config.password.clone()),
            from_name: config.from_name.clone(),
            smtp_server: config.smtp_server.clone(),
            smtp_port: config.smtp_port,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,

    #[serde(default = "default_attachment_type")]
    pub content_type: String,

    /// Standard base64 of the file contents.
    pub content_base64: String,
}

fn default_attachment_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub plain_text: Option<String>,
    pub html_text: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}

impl OutgoingEmail {
    #[must_use]
    pub fn plain(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            plain_text: Some(body.into()),
            ..Self::default()
        }
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

/// Builds the MIME message: an alternative plain/html body, wrapped in a
/// mixed part when there are attachments.
pub fn build_message(from: &SenderIdentity, email: &OutgoingEmail) -> Result<Message, MailError> {
    if email.to.is_empty() {
        return Err(MailError::InvalidMessage(
            "at least one recipient is required".to_string(),
        ));
    }

    let sender_address = from
        .email
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
            address: from.email.clone(),
            reason: e.to_string(),
        })?;
    let mut builder = Message::builder()
        .from(Mailbox::new(from.from_name.clone(), sender_address))
        .subject(email.subject.clone());

    for to in &email.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in &email.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    for bcc in &email.bcc {
        builder = builder.bcc(parse_mailbox(bcc)?);
    }

    let body = match (&email.plain_text, &email.html_text) {
        (Some(plain), Some(html)) => {
            MultiPart::alternative_plain_html(plain.clone(), html.clone())
        }
        (Some(plain), None) => MultiPart::mixed().singlepart(SinglePart::plain(plain.clone())),
        (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
        (None, None) => {
            return Err(MailError::InvalidMessage(
                "a plain text or html body is required".to_string(),
            ));
        }
    };

    let message = if email.attachments.is_empty() {
        builder.multipart(body)
    } else {
        let mut mixed = MultiPart::mixed().multipart(body);
        for attachment in &email.attachments {
            let content = BASE64
                .decode(attachment.content_base64.trim())
                .map_err(|e| {
                    MailError::InvalidMessage(format!(
                        "attachment '{}' is not valid base64: {e}",
                        attachment.filename
                    ))
                })?;
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                MailError::InvalidMessage(format!(
                    "attachment '{}' has invalid content type: {e}",
                    attachment.filename
                ))
            })?;
            mixed = mixed
                .singlepart(Attachment::new(attachment.filename.clone()).body(content, content_type));
        }
        builder.multipart(mixed)
    };

    message.map_err(|e| MailError::InvalidMessage(e.to_string()))
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, from: &SenderIdentity, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Sends through the sender's own SMTP relay, authenticated with its credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpMailTransport;

impl SmtpMailTransport {
    fn mailer(from: &SenderIdentity) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let credentials = Credentials::new(from.email.clone(), from.password.to_string());

        let builder = if from.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&from.smtp_server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&from.smtp_server)
        }
        .map_err(|e| MailError::Delivery(e.to_string()))?;

        Ok(builder
            .port(from.smtp_port)
            .credentials(credentials)
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, from: &SenderIdentity, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = build_message(from, email)?;
        let mailer = Self::mailer(from)?;

        let outcome = mailer.send(message).await;
        let label = if outcome.is_ok() { "sent" } else { "failed" };
        metrics::counter!("hermes_emails_sent_total", "outcome" => label).increment(1);

        outcome.map_err(|e| MailError::Delivery(e.to_string()))?;
        info!(
            from = %from.email,
            recipients = email.to.len() + email.cc.len() + email.bcc.len(),
            "Email sent"
        );
        Ok(())
    }
}

/// Hermes' own messages to admins and users. Failures are logged, never returned.
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    sender: Option<DefaultSenderConfig>,
    notify_admins_on_registration: bool,
    notify_user_on_approval: bool,
}

impl Notifier {
    #[must_use]
    pub fn new(transport: Arc<dyn MailTransport>, config: &MailConfig) -> Self {
        Self {
            transport,
            sender: config.default_sender.clone(),
            notify_admins_on_registration: config.notify_admins_on_registration,
            notify_user_on_approval: config.notify_user_on_approval,
        }
    }

    /// A notifier that never sends anything.
    #[must_use]
    pub fn disabled(transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            sender: None,
            notify_admins_on_registration: false,
            notify_user_on_approval: false,
        }
    }

    async fn deliver(&self, email: OutgoingEmail) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = self
            .transport
            .send(&SenderIdentity::from(sender), &email)
            .await
        {
            warn!(error = %e, subject = %email.subject, "Failed to deliver notification");
        }
    }

    pub async fn user_registered(&self, user: &User, admins: &[User]) {
        if !self.notify_admins_on_registration || admins.is_empty() {
            return;
        }

        let body = format!(
            "A new user has registered and is waiting for approval.\n\n\
             Name: {}\nEmail: {}\nUser ID: {}\n",
            user.name, user.email, user.id
        );
        futures::future::join_all(admins.iter().map(|admin| {
            self.deliver(OutgoingEmail::plain(
                admin.email.clone(),
                "New Hermes registration awaiting approval",
                body.clone(),
            ))
        }))
        .await;
    }

    pub async fn user_approved(&self, user: &User) {
        if !self.notify_user_on_approval {
            return;
        }

        let body = format!(
            "Hello {},\n\nYour Hermes account has been approved. \
             The API key you received at registration is now active.\n",
            user.name
        );
        self.deliver(OutgoingEmail::plain(
            user.email.clone(),
            "Your Hermes account has been approved",
            body,
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> SenderIdentity {
        SenderIdentity {
            email: "bot@example.com".to_string(),
            password: Zeroizing::new("app-password".to_string()),
            from_name: Some("Hermes Bot".to_string()),
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).to_string()
    }

    #[test]
    fn test_plain_and_html_become_alternative() {
        let email = OutgoingEmail {
            to: vec!["alice@example.com".to_string()],
            cc: vec!["carol@example.com".to_string()],
            subject: "Hello".to_string(),
            plain_text: Some("plain body".to_string()),
            html_text: Some("<p>html body</p>".to_string()),
            ..OutgoingEmail::default()
        };

        let text = formatted(&build_message(&sender(), &email).unwrap());
        assert!(text.contains("multipart/alternative"));
        assert!(text.contains("plain body"));
        assert!(text.contains("<p>html body</p>"));
        assert!(text.contains("carol@example.com"));
        assert!(text.contains("<bot@example.com>"));
        assert!(!text.contains("app-password"));
    }

    #[test]
    fn test_attachment_is_included() {
        let email = OutgoingEmail {
            to: vec!["alice@example.com".to_string()],
            subject: "Report".to_string(),
            plain_text: Some("see attached".to_string()),
            attachments: vec![EmailAttachment {
                filename: "report.txt".to_string(),
                content_type: "text/plain".to_string(),
                content_base64: BASE64.encode("quarterly numbers"),
            }],
            ..OutgoingEmail::default()
        };

        let text = formatted(&build_message(&sender(), &email).unwrap());
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("report.txt"));
    }

    #[test]
    fn test_invalid_messages_are_rejected() {
        let no_recipient = OutgoingEmail {
            subject: "x".to_string(),
            plain_text: Some("x".to_string()),
            ..OutgoingEmail::default()
        };
        assert!(matches!(
            build_message(&sender(), &no_recipient),
            Err(MailError::InvalidMessage(_))
        ));

        let no_body = OutgoingEmail {
            to: vec!["alice@example.com".to_string()],
            ..OutgoingEmail::default()
        };
        assert!(matches!(
            build_message(&sender(), &no_body),
            Err(MailError::InvalidMessage(_))
        ));

        let bad_address = OutgoingEmail::plain("not an address", "x", "x");
        assert!(matches!(
            build_message(&sender(), &bad_address),
            Err(MailError::InvalidAddress { .. })
        ));

        let mut bad_attachment = OutgoingEmail::plain("alice@example.com", "x", "x");
        bad_attachment.attachments.push(EmailAttachment {
            filename: "a.bin".to_string(),
            content_type: default_attachment_type(),
            content_base64: "***".to_string(),
        });
        assert!(build_message(&sender(), &bad_attachment).is_err());
    }

    #[test]
    fn test_sender_debug_redacts_password() {
        assert!(!format!("{:?}", sender()).contains("app-password"));
    }
}
