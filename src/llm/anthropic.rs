//! Anthropic messages API provider.

use super::{ChatMessage, ChatModel, ChatRequest, ModelReply, ToolInvocation};
use crate::config::LlmSettings;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Chat model backed by the Anthropic messages API.
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for AnthropicModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicModel {
    pub fn new(api_key: &str, settings: &LlmSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: settings.anthropic_base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        }
    }

    /// Convert conversation history to Anthropic wire messages.
    ///
    /// Consecutive tool results are folded into a single user message, as the
    /// API requires all results for one assistant turn to arrive together.
    fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
        let mut wire: Vec<WireMessage> = Vec::new();

        for message in messages {
            match message {
                ChatMessage::User(text) => wire.push(WireMessage {
                    role: "user".to_string(),
                    content: WireContent::Text(text.clone()),
                }),
                ChatMessage::Assistant { text, tool_calls } => {
                    let mut blocks = Vec::new();
                    if let Some(text) = text.as_ref().filter(|t| !t.trim().is_empty()) {
                        blocks.push(WireBlock::Text { text: text.clone() });
                    }
                    for call in tool_calls {
                        blocks.push(WireBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.input.clone(),
                        });
                    }
                    // The API rejects assistant turns without content.
                    if blocks.is_empty() {
                        continue;
                    }
                    wire.push(WireMessage {
                        role: "assistant".to_string(),
                        content: WireContent::Blocks(blocks),
                    });
                }
                ChatMessage::ToolResult {
                    call_id, content, ..
                } => {
                    let block = WireBlock::ToolResult {
                        tool_use_id: call_id.clone(),
                        content: content.clone(),
                    };
                    let joins_previous = matches!(
                        wire.last(),
                        Some(WireMessage { role, content: WireContent::Blocks(_) }) if role == "user"
                    );
                    if joins_previous {
                        if let Some(WireMessage {
                            content: WireContent::Blocks(blocks),
                            ..
                        }) = wire.last_mut()
                        {
                            blocks.push(block);
                        }
                    } else {
                        wire.push(WireMessage {
                            role: "user".to_string(),
                            content: WireContent::Blocks(vec![block]),
                        });
                    }
                }
            }
        }

        wire
    }

    fn from_wire_response(response: WireResponse) -> ModelReply {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                WireBlock::Text { text } => texts.push(text),
                WireBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolInvocation { id, name, input })
                }
                WireBlock::ToolResult { .. } => {}
            }
        }

        let text = texts.join("\n");
        ModelReply {
            text: if text.trim().is_empty() { None } else { Some(text) },
            tool_calls,
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": Self::to_wire_messages(&request.messages),
        });
        if let Some(system) = &request.system {
            body["system"] = Value::String(system.clone());
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::Model(format!(
                "Anthropic API request failed with status {}: {}",
                status, error_text
            )));
        }

        let wire: WireResponse = response.json().await?;
        debug!(
            "Anthropic reply: blocks={}, stop_reason={:?}",
            wire.content.len(),
            wire.stop_reason
        );

        Ok(Self::from_wire_response(wire))
    }
}

// Anthropic wire types

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    content: WireContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_results_are_grouped() {
        let messages = vec![
            ChatMessage::user("update me"),
            ChatMessage::Assistant {
                text: Some("Checking".to_string()),
                tool_calls: vec![
                    ToolInvocation {
                        id: "a".to_string(),
                        name: "get_news".to_string(),
                        input: json!({"query": "x"}),
                    },
                    ToolInvocation {
                        id: "b".to_string(),
                        name: "get_news".to_string(),
                        input: json!({"query": "y"}),
                    },
                ],
            },
            ChatMessage::ToolResult {
                call_id: "a".to_string(),
                name: "get_news".to_string(),
                content: "first".to_string(),
            },
            ChatMessage::ToolResult {
                call_id: "b".to_string(),
                name: "get_news".to_string(),
                content: "second".to_string(),
            },
        ];

        let wire = AnthropicModel::to_wire_messages(&messages);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[2].role, "user");
        match &wire[2].content {
            WireContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            _ => panic!("expected tool result blocks"),
        }
    }

    #[test]
    fn test_empty_assistant_turns_are_skipped() {
        let messages = vec![
            ChatMessage::user("hello"),
            ChatMessage::Assistant {
                text: None,
                tool_calls: Vec::new(),
            },
            ChatMessage::user("still there?"),
            ChatMessage::Assistant {
                text: Some("  ".to_string()),
                tool_calls: vec![ToolInvocation {
                    id: "t".to_string(),
                    name: "transfer_to_news".to_string(),
                    input: json!({}),
                }],
            },
        ];

        let wire = AnthropicModel::to_wire_messages(&messages);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].role, "user");
        match &wire[2].content {
            WireContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert!(matches!(blocks[0], WireBlock::ToolUse { .. }));
            }
            _ => panic!("expected a tool_use block"),
        }
    }

    #[test]
    fn test_parse_tool_use_response() {
        let raw = json!({
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Here is your digest."},
                {"type": "tool_use", "id": "tu_1", "name": "send_email",
                 "input": {"subject": "Daily Digest", "body": "Summary text"}}
            ],
            "stop_reason": "tool_use"
        });

        let wire: WireResponse = serde_json::from_value(raw).unwrap();
        let reply = AnthropicModel::from_wire_response(wire);

        assert_eq!(reply.text.as_deref(), Some("Here is your digest."));
        let call = reply.find_tool_call("send_email").unwrap();
        assert_eq!(call.input["subject"], "Daily Digest");
    }
}
