use std::{sync::Arc, time::Duration};

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::submission::Submission;

use super::mailer::{MailTransport, OutboundEmail, TransportError};

pub const SUBMISSIONS_METRIC: &str = "contact_relay_submissions_total";

/// Fixed addressing for every relayed message.
#[derive(Debug, Clone)]
pub struct MailEnvelope {
    /// The service's own mailbox; also the SMTP account.
    pub sender: String,
    /// The operator inbox that receives submissions.
    pub recipient: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("mail transport did not complete within {0:?}")]
    TimedOut(Duration),
}

pub struct ContactService {
    transport: Arc<dyn MailTransport>,
    envelope: MailEnvelope,
    send_timeout: Duration,
}

impl ContactService {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        envelope: MailEnvelope,
        send_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            envelope,
            send_timeout,
        }
    }

    pub fn compose(&self, submission: &Submission) -> OutboundEmail {
        OutboundEmail {
            from: self.envelope.sender.clone(),
            to: self.envelope.recipient.clone(),
            reply_to: Some(submission.email().to_string()),
            subject: format!(
                "New message from {}: {}",
                submission.name(),
                submission.subject()
            ),
            body: format!(
                "Name: {}\nEmail: {}\nSubject: {}\nMessage: {}\n",
                submission.name(),
                submission.email(),
                submission.subject(),
                submission.message()
            ),
        }
    }

    /// Compose and hand the message to the transport, bounded by the send timeout.
    pub async fn relay(&self, submission: Submission) -> Result<(), RelayError> {
        let email = self.compose(&submission);

        let outcome = match tokio::time::timeout(self.send_timeout, self.transport.send(email)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(RelayError::Transport(err)),
            Err(_) => Err(RelayError::TimedOut(self.send_timeout)),
        };

        match &outcome {
            Ok(()) => {
                counter!(SUBMISSIONS_METRIC, "outcome" => "sent").increment(1);
                info!(
                    target = "contact_relay::contact",
                    reply_to = submission.email(),
                    "contact message relayed"
                );
            }
            Err(RelayError::TimedOut(after)) => {
                counter!(SUBMISSIONS_METRIC, "outcome" => "timed_out").increment(1);
                warn!(
                    target = "contact_relay::contact",
                    timeout_ms = after.as_millis() as u64,
                    "mail transport timed out"
                );
            }
            Err(RelayError::Transport(_)) => {
                counter!(SUBMISSIONS_METRIC, "outcome" => "failed").increment(1);
            }
        }

        outcome
    }
}
