//! SMTP delivery through a well-known mail provider.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::debug;

use crate::application::mailer::{MailTransport, OutboundEmail, TransportError};
use crate::config::{MailProvider, MailSettings};

use super::error::InfraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    /// TLS from the first byte (port 465).
    Implicit,
    /// Plain connect upgraded with STARTTLS (port 587).
    StartTls,
}

impl MailProvider {
    pub fn relay_host(self) -> &'static str {
        match self {
            MailProvider::Gmail => "smtp.gmail.com",
            MailProvider::Outlook => "smtp.office365.com",
            MailProvider::Yahoo => "smtp.mail.yahoo.com",
            MailProvider::Icloud => "smtp.mail.me.com",
        }
    }

    fn security(self) -> Security {
        match self {
            MailProvider::Gmail | MailProvider::Yahoo => Security::Implicit,
            MailProvider::Outlook | MailProvider::Icloud => Security::StartTls,
        }
    }
}

#[derive(Clone)]
pub struct SmtpMailer {
    provider: MailProvider,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self, InfraError> {
        let host = settings.provider.relay_host();
        let builder = match settings.provider.security() {
            Security::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            Security::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
        }
        .map_err(|err| {
            InfraError::configuration(format!("failed to configure SMTP relay `{host}`: {err}"))
        })?;

        let transport = builder
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(settings.timeout))
            .build();

        Ok(Self {
            provider: settings.provider,
            transport,
        })
    }

    pub fn provider(&self) -> MailProvider {
        self.provider
    }

    /// Open a connection and authenticate without sending anything.
    pub async fn probe(&self) -> Result<(), TransportError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::delivery(format!(
                "{} did not accept the connection",
                self.provider.relay_host()
            ))),
            Err(err) => Err(TransportError::delivery(err)),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(TransportError::delivery)
    }
}

fn build_message(email: OutboundEmail) -> Result<Message, TransportError> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|err| TransportError::address("sender", &email.from, err))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|err| TransportError::address("recipient", &email.to, err))?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(fold_line_breaks(&email.subject))
        .header(ContentType::TEXT_PLAIN);

    if let Some(reply_to) = email.reply_to.as_deref() {
        match reply_to.parse::<Mailbox>() {
            Ok(mailbox) => builder = builder.reply_to(mailbox),
            Err(err) => debug!(
                target = "contact_relay::mail",
                error = %err,
                "skipping reply-to header lettre cannot represent"
            ),
        }
    }

    builder
        .body(email.body)
        .map_err(|err| TransportError::Build(err.to_string()))
}

fn fold_line_breaks(subject: &str) -> String {
    subject
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
