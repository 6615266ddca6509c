//! Conversation session with hand-offs between agents.

use super::agents::AgentRoster;
use super::state::{bound_functions, transition, AgentKind, Effect, RouterFunction};
use super::tools::{tool_spec, FunctionCall, RouterTools};
use crate::error::{AssistantError, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ToolInvocation};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Record of a function call made during a turn.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Agent that made the call.
    pub agent: AgentKind,
    /// Name of the function called.
    pub name: String,
    /// JSON arguments passed to the function.
    pub arguments: String,
    /// Result returned to the model.
    pub result: String,
}

impl std::fmt::Display for ToolCallRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.arguments)
    }
}

/// Result of one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text of the final reply.
    pub reply: String,
    /// Agent active when the turn ended.
    pub agent: AgentKind,
    /// Hand-offs made during the turn, as `(from, to)`.
    pub handoffs: Vec<(AgentKind, AgentKind)>,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Number of model calls used.
    pub iterations: usize,
}

/// One conversation. Owns its history and the active agent.
pub struct RouterSession {
    model: Arc<dyn ChatModel>,
    roster: Arc<AgentRoster>,
    tools: Arc<RouterTools>,
    history: Vec<ChatMessage>,
    active: AgentKind,
    max_iterations: usize,
    max_tokens: u32,
}

impl RouterSession {
    pub fn new(model: Arc<dyn ChatModel>, roster: Arc<AgentRoster>, tools: Arc<RouterTools>) -> Self {
        Self {
            model,
            roster,
            tools,
            history: Vec::new(),
            active: AgentKind::Main,
            max_iterations: 15,
            max_tokens: 3084,
        }
    }

    /// Set maximum model calls per turn.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn active(&self) -> AgentKind {
        self.active
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Forget the conversation and return to the Main agent.
    pub fn reset(&mut self) {
        self.history.clear();
        self.active = AgentKind::Main;
    }

    /// Handle one user message and return the reply of whichever agent ends up answering.
    pub async fn run_turn(&mut self, user_text: &str) -> Result<TurnOutcome> {
        self.history.push(ChatMessage::user(user_text));

        let mut handoffs = Vec::new();
        let mut tool_calls = Vec::new();

        for iteration in 1..=self.max_iterations {
            let profile = self.roster.get(self.active);
            debug!("Router iteration {} with {}", iteration, profile.name);

            let request = ChatRequest {
                system: Some(profile.instruction.clone()),
                messages: self.history.clone(),
                tools: bound_functions(self.active)
                    .into_iter()
                    .map(tool_spec)
                    .collect(),
                max_tokens: self.max_tokens,
            };

            let reply = self.model.complete(request).await?;
            self.history.push(reply.to_message());

            if reply.tool_calls.is_empty() {
                return Ok(TurnOutcome {
                    reply: reply.text.unwrap_or_default(),
                    agent: self.active,
                    handoffs,
                    tool_calls,
                    iterations: iteration,
                });
            }

            // Calls are checked against the agent that made them; a hand-off
            // takes effect once every call in the reply has been answered.
            let mut next_agent = None;
            for call in &reply.tool_calls {
                let (result, handoff) = self.dispatch(call).await;

                self.history.push(ChatMessage::ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: result.clone(),
                });
                tool_calls.push(ToolCallRecord {
                    agent: self.active,
                    name: call.name.clone(),
                    arguments: call.input.to_string(),
                    result,
                });

                if handoff.is_some() {
                    next_agent = handoff;
                }
            }

            if let Some(next) = next_agent {
                info!("Handing off from {} to {}", self.active, next);
                handoffs.push((self.active, next));
                self.active = next;
            }
        }

        Err(AssistantError::Router(format!(
            "Turn exceeded maximum iterations ({})",
            self.max_iterations
        )))
    }

    /// Resolve and run one tool call for the active agent.
    async fn dispatch(&self, call: &ToolInvocation) -> (String, Option<AgentKind>) {
        info!("{} calling {} with {}", self.active, call.name, call.input);

        let function: RouterFunction = match call.name.parse() {
            Ok(function) => function,
            Err(e) => return (format!("Error: {}", e), None),
        };

        let effect = match transition(self.active, function) {
            Some(effect) => effect,
            None => {
                warn!("{} is not bound to {}", function, self.active);
                return (
                    format!("Error: {} is not available to the {}", function, self.active),
                    None,
                );
            }
        };

        let parsed = match FunctionCall::parse(function, &call.input) {
            Ok(parsed) => parsed,
            Err(e) => return (format!("Error: {}", e), None),
        };

        match effect {
            Effect::HandOff(next) => (format!("Transferred to {}.", next), Some(next)),
            Effect::Invoke => match self.tools.execute(&parsed).await {
                Ok(result) => (result, None),
                Err(e) => (format!("Error: {}", e), None),
            },
        }
    }
}
