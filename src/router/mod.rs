//! Multi-agent forecast chat.
//!
//! A Main agent routes each request to the Query, Bayes or News agent by
//! calling a hand-off function; sub-agents hand back to Main when a request
//! is out of their remit. The allowed moves live in [`state::TRANSITIONS`].

pub mod agents;
pub mod session;
pub mod state;
pub mod tools;

pub use agents::{AgentProfile, AgentRoster};
pub use session::{RouterSession, ToolCallRecord, TurnOutcome};
pub use state::{bound_functions, transition, AgentKind, Effect, RouterFunction, TRANSITIONS};
pub use tools::{calc_posterior, tool_spec, FunctionCall, RouterTools, ZeroEvidence};

use crate::config::{Credentials, Prompts, Settings};
use crate::error::Result;
use crate::forecasts::create_store;
use crate::llm::{create_model, ChatModel};
use crate::news::{AskNewsClient, NewsSource};
use std::sync::Arc;
use tracing::warn;

/// Immutable pieces shared by every session: model, roster and tool backends.
#[derive(Clone)]
pub struct RouterServices {
    model: Arc<dyn ChatModel>,
    roster: Arc<AgentRoster>,
    tools: Arc<RouterTools>,
    max_iterations: usize,
    max_tokens: u32,
}

impl RouterServices {
    pub fn new(model: Arc<dyn ChatModel>, roster: AgentRoster, tools: RouterTools) -> Self {
        Self {
            model,
            roster: Arc::new(roster),
            tools: Arc::new(tools),
            max_iterations: 15,
            max_tokens: 3084,
        }
    }

    /// Build the model, forecast store and news client from configuration.
    ///
    /// News search is optional: without AskNews credentials `get_news`
    /// answers with an error result instead of failing the session.
    pub fn from_settings(settings: &Settings, credentials: &Credentials) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let model = create_model(&settings.llm, credentials)?;
        let store = create_store(settings, credentials)?;

        let news: Option<Arc<dyn NewsSource>> =
            match AskNewsClient::from_credentials(credentials, &settings.news) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };

        let tools = RouterTools::new(store, news).with_article_count(settings.news.article_count);

        Ok(Self {
            max_iterations: settings.router.max_iterations,
            max_tokens: settings.llm.max_tokens,
            ..Self::new(model, AgentRoster::from_prompts(&prompts), tools)
        })
    }

    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    /// Start a new conversation at the Main agent.
    pub fn session(&self) -> RouterSession {
        RouterSession::new(self.model.clone(), self.roster.clone(), self.tools.clone())
            .with_max_iterations(self.max_iterations)
            .with_max_tokens(self.max_tokens)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::forecasts::SqliteForecastStore;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::ModelReply;

    /// Services over a scripted model and an empty in-memory store.
    pub fn scripted_services(replies: Vec<ModelReply>) -> RouterServices {
        let store = Arc::new(SqliteForecastStore::in_memory(true).unwrap());
        RouterServices::new(
            Arc::new(ScriptedModel::new(replies)),
            AgentRoster::default(),
            RouterTools::new(store, None),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseProvider;
    use tempfile::TempDir;

    #[test]
    fn test_from_settings_without_news_credentials() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.database.provider = DatabaseProvider::Sqlite;
        settings.database.sqlite_path = dir.path().join("forecasts.db").to_string_lossy().to_string();
        settings.router.max_iterations = 4;

        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Credentials::default()
        };

        let services = RouterServices::from_settings(&settings, &credentials).unwrap();
        assert_eq!(services.model().provider(), "openai");

        let session = services.session();
        assert_eq!(session.active(), AgentKind::Main);
        assert!(session.history().is_empty());
    }
}
