//! OpenAI chat completions provider.

use super::{ChatMessage, ChatModel, ChatRequest, ModelReply, ToolInvocation, ToolSpec};
use crate::config::LlmSettings;
use crate::error::{AssistantError, Result};
use crate::openai::create_client_with_timeout;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObject,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Chat model backed by the OpenAI API.
pub struct OpenAIModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAIModel {
    pub fn new(api_key: &str, settings: &LlmSettings) -> Self {
        Self {
            client: create_client_with_timeout(api_key, Duration::from_secs(settings.timeout_secs)),
            model: settings.model.clone(),
        }
    }

    fn convert_messages(
        system: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut converted: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system {
            converted.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| AssistantError::Model(e.to_string()))?
                    .into(),
            );
        }

        for message in messages {
            let msg: ChatCompletionRequestMessage = match message {
                ChatMessage::User(text) => ChatCompletionRequestUserMessageArgs::default()
                    .content(text.as_str())
                    .build()
                    .map_err(|e| AssistantError::Model(e.to_string()))?
                    .into(),
                ChatMessage::Assistant { text, tool_calls } => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    if let Some(text) = text {
                        args.content(text.as_str());
                    }
                    if !tool_calls.is_empty() {
                        args.tool_calls(
                            tool_calls
                                .iter()
                                .map(|call| ChatCompletionMessageToolCall {
                                    id: call.id.clone(),
                                    r#type: ChatCompletionToolType::Function,
                                    function: FunctionCall {
                                        name: call.name.clone(),
                                        arguments: call.input.to_string(),
                                    },
                                })
                                .collect::<Vec<_>>(),
                        );
                    }
                    args.build()
                        .map_err(|e| AssistantError::Model(e.to_string()))?
                        .into()
                }
                ChatMessage::ToolResult {
                    call_id, content, ..
                } => ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(call_id.as_str())
                    .content(content.as_str())
                    .build()
                    .map_err(|e| AssistantError::Model(e.to_string()))?
                    .into(),
            };
            converted.push(msg);
        }

        Ok(converted)
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<ChatCompletionTool> {
        tools
            .iter()
            .map(|tool| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    parameters: Some(tool.parameters.clone()),
                    strict: None,
                },
            })
            .collect()
    }

    /// Parse tool call arguments; unparseable JSON is passed through as a string.
    fn parse_arguments(arguments: &str) -> serde_json::Value {
        serde_json::from_str(arguments)
            .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAIModel {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply> {
        let messages = Self::convert_messages(request.system.as_deref(), &request.messages)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .max_completion_tokens(request.max_tokens);
        if !request.tools.is_empty() {
            args.tools(Self::convert_tools(&request.tools));
        }
        let openai_request = args
            .build()
            .map_err(|e| AssistantError::Model(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| AssistantError::OpenAI(format!("Chat API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::Model("No response from model".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolInvocation {
                id: call.id,
                input: Self::parse_arguments(&call.function.arguments),
                name: call.function.name,
            })
            .collect::<Vec<_>>();

        debug!("OpenAI reply with {} tool call(s)", tool_calls.len());

        Ok(ModelReply {
            text: choice.message.content.filter(|t| !t.is_empty()),
            tool_calls,
        })
    }
}
