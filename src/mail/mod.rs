//! Email access.
//!
//! The digest reads labelled news emails and sends its summary through a
//! [`Mailer`]. [`GmailClient`] is the production implementation.

pub mod auth;
pub mod body;
mod gmail;

pub use auth::{ClientSecrets, GmailAuth, StoredToken, GMAIL_SCOPES};
pub use body::{extract_body, MessagePart};
pub use gmail::GmailClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Subject used when a message carries no `Subject` header.
pub const NO_SUBJECT: &str = "(no subject)";

/// Sender used when a message carries no `From` header.
pub const UNKNOWN_SENDER: &str = "(unknown sender)";

/// An email flattened to the fields the digest needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub text: String,
}

impl EmailMessage {
    /// Body text with whitespace collapsed, truncated to `max_chars` characters.
    pub fn snippet(&self, max_chars: usize) -> String {
        let collapsed = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.chars().count() <= max_chars {
            collapsed
        } else {
            let mut truncated: String = collapsed.chars().take(max_chars).collect();
            truncated.push('…');
            truncated
        }
    }
}

/// A message to send to the configured recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub subject: String,
    pub body: String,
}

/// Acknowledgement returned by the mail provider for a sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub id: String,
    #[serde(default, rename = "threadId")]
    pub thread_id: Option<String>,
}

/// Trait for mailbox implementations.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Fetch up to `count` of the most recent messages carrying `label`, newest first.
    async fn list_recent(&self, count: u32, label: &str) -> Result<Vec<EmailMessage>>;

    /// Send a message to the configured recipient.
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt>;
}
