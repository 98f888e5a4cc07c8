use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address '{0}'")]
    Address(String),

    #[error(transparent)]
    Build(#[from] lettre::error::Error),

    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(SmtpMailer {
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|_| MailError::Address(address.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let mut builder = Message::builder()
            .from(mailbox(&email.from)?)
            .subject(email.subject.clone());
        for recipient in &email.to {
            builder = builder.to(mailbox(recipient)?);
        }
        let content_type = if email.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };
        let message = builder.header(content_type).body(email.body.clone())?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Writes emails to the log instead of sending them.
#[derive(Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(
            "Email to {:?} from '{}' with subject '{}'",
            email.to, email.from, email.subject
        );
        debug!("Email body:\n{}", email.body);
        Ok(())
    }
}

/// Keeps sent emails in memory. Can be told to reject the next few sends.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<RwLock<Vec<OutgoingEmail>>>,
    failures_left: Arc<RwLock<usize>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures_left.write() = count;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.read().clone()
    }

    pub fn find_by_subject(&self, subject: &str) -> Vec<OutgoingEmail> {
        self.sent
            .read()
            .iter()
            .filter(|email| email.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        {
            let mut failures = self.failures_left.write();
            if *failures > 0 {
                *failures -= 1;
                return Err(MailError::Rejected("simulated outage".into()));
            }
        }
        self.sent.write().push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            from: "shop@example.com".into(),
            to: vec!["a@b.com".into()],
            subject: "Hello".into(),
            body: "Hi".into(),
            html: false,
        }
    }

    #[tokio::test]
    async fn memory_mailer_records_and_fails_on_request() {
        let mailer = MemoryMailer::new();
        mailer.fail_next(1);
        assert!(mailer.send(&email()).await.is_err());
        mailer.send(&email()).await.unwrap();
        assert_eq!(mailer.sent(), vec![email()]);
        assert_eq!(mailer.find_by_subject("Hello").len(), 1);
    }

    #[test]
    fn bad_addresses_are_reported() {
        assert!(matches!(mailbox("not an address"), Err(MailError::Address(_))));
        assert!(mailbox("Shop <shop@example.com>").is_ok());
    }
}
