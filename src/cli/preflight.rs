//! Pre-flight checks before networked operations.
//!
//! Validates that credentials and configuration are available before
//! starting operations that would otherwise fail midway.

use crate::config::{Credentials, DatabaseProvider, Settings};
use crate::error::{AssistantError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// The digest reads Gmail, the forecast database and calls the model.
    Digest,
    /// The agent chat needs the model and the forecast database.
    Router,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings, credentials: &Credentials) -> Result<()> {
    check_llm_key(settings, credentials)?;
    check_database(settings, credentials)?;

    if let Operation::Digest = operation {
        check_gmail(settings)?;
    }
    Ok(())
}

/// Check that the configured provider's API key is present.
fn check_llm_key(settings: &Settings, credentials: &Credentials) -> Result<()> {
    let provider = settings.llm.provider;
    match credentials.llm_api_key(provider) {
        Some(_) => Ok(()),
        None => Err(AssistantError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            provider.api_key_var(),
            provider.api_key_var()
        ))),
    }
}

fn check_database(settings: &Settings, credentials: &Credentials) -> Result<()> {
    match settings.database.provider {
        DatabaseProvider::Postgres if credentials.db_password.is_none() => Err(AssistantError::Config(
            "DB_PASSWORD not set. Set it with: export DB_PASSWORD='...'".to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_gmail(settings: &Settings) -> Result<()> {
    if settings.gmail.recipient.trim().is_empty() {
        return Err(AssistantError::Config(
            "gmail.recipient is not set. Add it to the [gmail] section of the config file."
                .to_string(),
        ));
    }

    let token = settings.gmail_token_path();
    let secrets = settings.gmail_credentials_path();
    if !token.exists() && !secrets.exists() {
        return Err(AssistantError::Auth(format!(
            "Neither {:?} nor {:?} exists. Download OAuth client secrets from the Google Cloud console.",
            token, secrets
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;
    use tempfile::TempDir;

    fn sqlite_settings() -> Settings {
        let mut settings = Settings::default();
        settings.database.provider = DatabaseProvider::Sqlite;
        settings
    }

    #[test]
    fn test_router_needs_only_model_key_on_sqlite() {
        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Credentials::default()
        };
        assert!(check(Operation::Router, &sqlite_settings(), &credentials).is_ok());
    }

    #[test]
    fn test_missing_key_names_the_variable() {
        let mut settings = sqlite_settings();
        settings.llm.provider = LlmProvider::Anthropic;

        let err = check(Operation::Router, &settings, &Credentials::default()).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_postgres_needs_password() {
        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Credentials::default()
        };
        let err = check(Operation::Router, &Settings::default(), &credentials).unwrap_err();
        assert!(err.to_string().contains("DB_PASSWORD"));
    }

    #[test]
    fn test_digest_needs_recipient_and_gmail_files() {
        let dir = TempDir::new().unwrap();
        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Credentials::default()
        };
        let mut settings = sqlite_settings();
        settings.gmail.credentials_path = dir.path().join("credentials.json").to_string_lossy().to_string();
        settings.gmail.token_path = dir.path().join("token.json").to_string_lossy().to_string();

        assert!(check(Operation::Digest, &settings, &credentials).is_err());

        settings.gmail.recipient = "me@example.com".to_string();
        let err = check(Operation::Digest, &settings, &credentials).unwrap_err();
        assert!(matches!(err, AssistantError::Auth(_)));

        std::fs::write(dir.path().join("credentials.json"), "{}").unwrap();
        assert!(check(Operation::Digest, &settings, &credentials).is_ok());
    }
}
