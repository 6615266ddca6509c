//! Configuration module for the forecast assistant.
//!
//! Handles loading application settings, environment credentials and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AgentPrompts, DigestPrompts, Prompts};
pub use settings::{
    Credentials, DatabaseProvider, DatabaseSettings, DigestSettings, GeneralSettings,
    GmailSettings, LlmProvider, LlmSettings, NewsSettings, PromptSettings, RouterSettings,
    ServerSettings, Settings,
};
