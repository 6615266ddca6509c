//! Digest prompt assembly and reply interpretation.

use crate::error::{AssistantError, Result};
use crate::forecasts::Forecast;
use crate::llm::{ModelReply, ToolSpec};
use crate::mail::{EmailMessage, OutboundEmail};
use serde::Deserialize;
use serde_json::json;

/// Name of the single tool offered to the model.
pub const SEND_EMAIL_TOOL: &str = "send_email";

/// How the outbound email was obtained from the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// The model called `send_email`; its arguments were used verbatim.
    ToolCall,
    /// The model answered in prose; the text became the body.
    PlainText,
}

#[derive(Debug, Deserialize)]
struct SendEmailArgs {
    subject: String,
    body: String,
}

/// Schema of the `send_email(subject, body)` tool.
pub fn send_email_tool() -> ToolSpec {
    ToolSpec {
        name: SEND_EMAIL_TOOL.to_string(),
        description: "Send an email to yourself.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "subject": {
                    "type": "string",
                    "description": "The subject of the email"
                },
                "body": {
                    "type": "string",
                    "description": "The body content of the email"
                }
            },
            "required": ["subject", "body"]
        }),
    }
}

/// Append the forecast and email listings to the template.
pub fn render_prompt(
    template: &str,
    forecasts: &[Forecast],
    emails: &[EmailMessage],
    snippet_chars: usize,
) -> String {
    let mut prompt = String::from(template);

    prompt.push_str("\n\nForecasts:\n");
    for forecast in forecasts {
        prompt.push_str(&format!("- {}\n", forecast));
    }

    prompt.push_str("\nEmails:\n");
    for email in emails {
        prompt.push_str(&format!(
            "- From: {} | Subject: {} | {}\n",
            email.sender,
            email.subject,
            email.snippet(snippet_chars)
        ));
    }

    prompt
}

/// Turn the model reply into the email to send.
///
/// A well-formed `send_email` call wins. Otherwise non-empty reply text is
/// sent under `fallback_subject`. A reply with neither is an error.
pub fn resolve_outbound(
    reply: &ModelReply,
    fallback_subject: &str,
) -> Result<(OutboundEmail, Composition)> {
    if let Some(call) = reply.find_tool_call(SEND_EMAIL_TOOL) {
        match serde_json::from_value::<SendEmailArgs>(call.input.clone()) {
            Ok(args) => {
                return Ok((
                    OutboundEmail {
                        subject: args.subject,
                        body: args.body,
                    },
                    Composition::ToolCall,
                ))
            }
            Err(e) => tracing::warn!("Ignoring malformed send_email call: {}", e),
        }
    }

    match reply.text.as_deref() {
        Some(text) if !text.trim().is_empty() => Ok((
            OutboundEmail {
                subject: fallback_subject.to_string(),
                body: text.to_string(),
            },
            Composition::PlainText,
        )),
        _ => Err(AssistantError::Model(
            "Model reply contained neither a send_email call nor text".to_string(),
        )),
    }
}
