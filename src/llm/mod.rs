//! Provider-agnostic language model access.
//!
//! The digest and the agent router talk to a [`ChatModel`] rather than to a
//! concrete SDK, so either provider (or a scripted stub) can be plugged in.

mod anthropic;
mod openai;

pub use anthropic::AnthropicModel;
pub use openai::OpenAIModel;

use crate::config::{Credentials, LlmProvider, LlmSettings};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A single entry in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolInvocation>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage::User(text.into())
    }
}

/// A tool the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A structured tool call emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// One request to the model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

/// The model's answer: free text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(id: &str, name: &str, input: Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolInvocation {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
        }
    }

    /// Find the first tool call with the given name.
    pub fn find_tool_call(&self, name: &str) -> Option<&ToolInvocation> {
        self.tool_calls.iter().find(|c| c.name == name)
    }

    /// Converts the reply into the assistant message recorded in history.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::Assistant {
            text: self.text.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

/// Trait for language model implementations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name, for logging.
    fn provider(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Send one request and return the model's reply.
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply>;
}

/// Build the configured model provider.
pub fn create_model(settings: &LlmSettings, credentials: &Credentials) -> Result<Arc<dyn ChatModel>> {
    let api_key = credentials
        .llm_api_key(settings.provider)
        .ok_or_else(|| {
            AssistantError::Config(format!(
                "{} not set. Set it with: export {}='...'",
                settings.provider.api_key_var(),
                settings.provider.api_key_var()
            ))
        })?
        .to_string();

    let model: Arc<dyn ChatModel> = match settings.provider {
        LlmProvider::OpenAI => Arc::new(OpenAIModel::new(&api_key, settings)),
        LlmProvider::Anthropic => Arc::new(AnthropicModel::new(&api_key, settings)),
    };
    Ok(model)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A model stub that replays canned replies and records every request.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<ModelReply>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<ModelReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ModelReply> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AssistantError::Model("script exhausted".to_string()))
        }
    }
}
