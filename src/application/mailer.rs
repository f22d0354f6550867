use async_trait::async_trait;
use thiserror::Error;

/// A fully composed message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid {role} address `{address}`: {reason}")]
    Address {
        role: &'static str,
        address: String,
        reason: String,
    },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("mail provider rejected delivery: {0}")]
    Delivery(String),
}

impl TransportError {
    pub fn address(role: &'static str, address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Address {
            role,
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn delivery(reason: impl ToString) -> Self {
        Self::Delivery(reason.to_string())
    }
}

/// Boundary to the mail-delivery provider. One attempt per call.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError>;
}
