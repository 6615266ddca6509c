//! Gmail REST client.

use super::auth::GmailAuth;
use super::body::{extract_body, MessagePart};
use super::{DeliveryReceipt, EmailMessage, Mailer, OutboundEmail, NO_SUBJECT, UNKNOWN_SENDER};
use crate::config::Settings;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    id: String,
    #[serde(default)]
    payload: MessagePart,
}

impl From<FullMessage> for EmailMessage {
    fn from(message: FullMessage) -> Self {
        let payload = &message.payload;
        EmailMessage {
            subject: payload.header("Subject").unwrap_or(NO_SUBJECT).to_string(),
            sender: payload.header("From").unwrap_or(UNKNOWN_SENDER).to_string(),
            text: extract_body(payload),
            id: message.id,
        }
    }
}

/// Mailbox backed by the Gmail API for the authorized user.
pub struct GmailClient {
    http: Client,
    auth: GmailAuth,
    api_base: String,
    recipient: String,
    sender: Option<String>,
}

impl GmailClient {
    pub fn new(auth: GmailAuth, api_base: &str, recipient: &str, sender: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            auth,
            api_base: api_base.trim_end_matches('/').to_string(),
            recipient: recipient.to_string(),
            sender,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let auth = GmailAuth::new(
            settings.gmail_credentials_path(),
            settings.gmail_token_path(),
            settings.gmail.interactive_auth,
        );
        Self::new(
            auth,
            &settings.gmail.api_base,
            &settings.gmail.recipient,
            settings.gmail.sender.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/me/{}", self.api_base, path)
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message> {
        if self.recipient.trim().is_empty() {
            return Err(AssistantError::Config(
                "gmail.recipient is not set. Set it in the config file.".to_string(),
            ));
        }

        let to: Mailbox = self
            .recipient
            .parse()
            .map_err(|e| AssistantError::Config(format!("Invalid recipient address: {}", e)))?;
        let from: Mailbox = match &self.sender {
            Some(sender) => sender
                .parse()
                .map_err(|e| AssistantError::Config(format!("Invalid sender address: {}", e)))?,
            None => to.clone(),
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| AssistantError::Delivery(format!("Failed to build message: {}", e)))
    }
}

/// Map auth failures to [`AssistantError::Auth`] and other failures with `other`.
async fn check_status(
    response: Response,
    other: impl FnOnce(String) -> AssistantError,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AssistantError::Auth(format!(
            "Gmail rejected credentials ({}): {}",
            status, body
        ))),
        _ => Err(other(format!("Gmail request failed ({}): {}", status, body))),
    }
}

#[async_trait]
impl Mailer for GmailClient {
    #[instrument(skip(self))]
    async fn list_recent(&self, count: u32, label: &str) -> Result<Vec<EmailMessage>> {
        let token = self.auth.access_token().await?;

        let mut query: Vec<(&str, String)> = vec![("maxResults", count.to_string())];
        if !label.is_empty() {
            query.push(("q", format!("label:{}", label)));
        }

        let response = self
            .http
            .get(self.url("messages"))
            .bearer_auth(&token)
            .query(&query)
            .send()
            .await?;
        let list: MessageList = check_status(response, AssistantError::Mail).await?.json().await?;

        debug!("Gmail listed {} message(s)", list.messages.len());

        let mut emails = Vec::with_capacity(list.messages.len());
        for message in list.messages {
            let response = self
                .http
                .get(self.url(&format!("messages/{}", message.id)))
                .bearer_auth(&token)
                .query(&[("format", "full")])
                .send()
                .await?;
            let full: FullMessage = check_status(response, AssistantError::Mail).await?.json().await?;
            emails.push(EmailMessage::from(full));
        }

        Ok(emails)
    }

    #[instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt> {
        let message = self.build_message(email)?;
        let raw = URL_SAFE.encode(message.formatted());
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .post(self.url("messages/send"))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        let receipt: DeliveryReceipt = check_status(response, AssistantError::Delivery)
            .await?
            .json()
            .await?;

        info!("Sent message {}", receipt.id);
        Ok(receipt)
    }
}
