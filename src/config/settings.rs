//! Configuration settings for the forecast assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub database: DatabaseSettings,
    pub gmail: GmailSettings,
    pub news: NewsSettings,
    pub digest: DigestSettings,
    pub router: RouterSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for credentials, tokens and the local database.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.forecast-assistant".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Language model provider type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions.
    #[default]
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
}

impl LlmProvider {
    /// Environment variable holding the API key for this provider.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAI),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAI => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider (openai, anthropic).
    pub provider: LlmProvider,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Maximum output tokens per call.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL for the Anthropic API.
    pub anthropic_base_url: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            model: "gpt-4o".to_string(),
            max_tokens: 3084,
            timeout_secs: 300,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
        }
    }
}

/// Database backend type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    /// Remote Postgres holding the forecast tables.
    #[default]
    Postgres,
    /// Local SQLite file with the same schema.
    Sqlite,
}

/// Forecast database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Backend (postgres, sqlite).
    pub provider: DatabaseProvider,
    /// Postgres host. Overridden by the HOST environment variable.
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    /// Path to the SQLite database (for the sqlite provider).
    pub sqlite_path: String,
    /// Restrict model-supplied SQL to single read-only statements.
    pub read_only_queries: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            provider: DatabaseProvider::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            sqlite_path: "~/.forecast-assistant/forecasts.db".to_string(),
            read_only_queries: true,
        }
    }
}

/// Gmail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailSettings {
    /// Google OAuth client secrets for an installed app.
    pub credentials_path: String,
    /// Persisted authorized-user token.
    pub token_path: String,
    /// Address the digest is sent to.
    pub recipient: String,
    /// Sender address. Defaults to the recipient.
    pub sender: Option<String>,
    /// Label news emails are filed under.
    pub label: String,
    /// Allow the browser consent flow when no usable token exists.
    pub interactive_auth: bool,
    /// Gmail REST API base URL.
    pub api_base: String,
}

impl Default for GmailSettings {
    fn default() -> Self {
        Self {
            credentials_path: "~/.forecast-assistant/credentials.json".to_string(),
            token_path: "~/.forecast-assistant/token.json".to_string(),
            recipient: String::new(),
            sender: None,
            label: "news".to_string(),
            interactive_auth: true,
            api_base: "https://gmail.googleapis.com".to_string(),
        }
    }
}

/// News search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    /// Number of articles per search.
    pub article_count: u32,
    /// AskNews API base URL.
    pub api_base: String,
    /// AskNews OAuth token endpoint.
    pub token_url: String,
    /// OAuth scopes requested for the client-credentials token.
    pub scopes: Vec<String>,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            article_count: 10,
            api_base: "https://api.asknews.app".to_string(),
            token_url: "https://auth.asknews.app/oauth2/token".to_string(),
            scopes: vec!["news".to_string(), "chat".to_string(), "stories".to_string()],
        }
    }
}

/// Digest pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    /// Number of labelled emails to include.
    pub email_count: u32,
    /// Prompt template file. Falls back to the built-in template.
    pub prompt_file: Option<String>,
    /// Subject used when the model answers with plain text.
    pub fallback_subject: String,
    /// Maximum characters of each email included in the prompt.
    pub snippet_chars: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            email_count: 10,
            prompt_file: None,
            fallback_subject: "Forecasts summary".to_string(),
            snippet_chars: 2000,
        }
    }
}

/// Agent router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Maximum model calls per user turn.
    pub max_iterations: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self { max_iterations: 15 }
    }
}

/// WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Words per streamed reply fragment.
    pub words_per_chunk: usize,
    /// Delay between streamed fragments in milliseconds.
    pub chunk_delay_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            words_per_chunk: 8,
            chunk_delay_ms: 30,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

/// Secrets read from the environment. Never written to the config file.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub ask_client_id: Option<String>,
    pub ask_client_secret: Option<String>,
    pub db_password: Option<String>,
    pub db_host: Option<String>,
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup, ignoring empty values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            ask_client_id: get("ASK_CLIENT_ID"),
            ask_client_secret: get("ASK_CLIENT_SECRET"),
            db_password: get("DB_PASSWORD"),
            db_host: get("HOST"),
        }
    }

    /// API key for the given language model provider.
    pub fn llm_api_key(&self, provider: LlmProvider) -> Option<&str> {
        match provider {
            LlmProvider::OpenAI => self.openai_api_key.as_deref(),
            LlmProvider::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("ask_client_id", &mask(&self.ask_client_id))
            .field("ask_client_secret", &mask(&self.ask_client_secret))
            .field("db_password", &mask(&self.db_password))
            .field("db_host", &self.db_host)
            .finish()
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forecast-assistant")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.database.sqlite_path)
    }

    pub fn gmail_credentials_path(&self) -> PathBuf {
        Self::expand_path(&self.gmail.credentials_path)
    }

    pub fn gmail_token_path(&self) -> PathBuf {
        Self::expand_path(&self.gmail.token_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_pipeline() {
        let settings = Settings::default();
        assert_eq!(settings.digest.email_count, 10);
        assert_eq!(settings.gmail.label, "news");
        assert_eq!(settings.llm.max_tokens, 3084);
        assert_eq!(settings.digest.fallback_subject, "Forecasts summary");
        assert!(settings.database.read_only_queries);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [llm]
            provider = "anthropic"
            model = "claude-3-5-sonnet-20240620"

            [gmail]
            recipient = "me@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(settings.llm.provider, LlmProvider::Anthropic);
        assert_eq!(settings.llm.max_tokens, 3084);
        assert_eq!(settings.gmail.recipient, "me@example.com");
        assert_eq!(settings.gmail.label, "news");
        assert_eq!(settings.server.port, 8000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.database.provider = DatabaseProvider::Sqlite;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.database.provider, DatabaseProvider::Sqlite);
    }

    #[test]
    fn test_credentials_ignore_empty_values() {
        let creds = Credentials::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "DB_PASSWORD" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(creds.llm_api_key(LlmProvider::OpenAI), Some("sk-test"));
        assert_eq!(creds.llm_api_key(LlmProvider::Anthropic), None);
        assert!(creds.db_password.is_none());
        assert!(!format!("{:?}", creds).contains("sk-test"));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("claude".parse::<LlmProvider>().unwrap(), LlmProvider::Anthropic);
        assert!("mistral".parse::<LlmProvider>().is_err());
    }
}
