//! Doctor command - verify credentials and configuration.

use crate::cli::Output;
use crate::config::{Credentials, DatabaseProvider, Settings};
use crate::forecasts::create_store;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Forecast Assistant Doctor");
    println!();
    println!("Checking credentials and configuration...\n");

    let credentials = Credentials::from_env();
    let mut checks = Vec::new();

    let sections: Vec<(&str, Vec<CheckResult>)> = vec![
        ("Credentials", check_credentials(settings, &credentials)),
        ("Gmail", check_gmail(settings)),
        ("Forecast Database", vec![check_database(settings, &credentials).await]),
        ("Configuration", vec![check_config_file()]),
    ];

    for (title, results) in sections {
        println!("{}", style(title).bold());
        for check in &results {
            check.print();
        }
        println!();
        checks.extend(results);
    }

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!("{} error(s) found. Please fix them before running a digest.", errors));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! The forecast assistant is ready to use.");
    }

    Ok(())
}

/// Check the environment variables the configured services need.
fn check_credentials(settings: &Settings, credentials: &Credentials) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let provider = settings.llm.provider;
    let var = provider.api_key_var();
    results.push(match credentials.llm_api_key(provider) {
        Some(key) => CheckResult::ok(
            var,
            &format!("configured ({}, model {})", mask(key), settings.llm.model),
        ),
        None => CheckResult::error(var, "not set", &format!("Set with: export {}='...'", var)),
    });

    results.push(match (&credentials.ask_client_id, &credentials.ask_client_secret) {
        (Some(_), Some(_)) => CheckResult::ok("AskNews", "ASK_CLIENT_ID and ASK_CLIENT_SECRET set"),
        _ => CheckResult::warning(
            "AskNews",
            "credentials not set",
            "The News agent cannot search without ASK_CLIENT_ID and ASK_CLIENT_SECRET",
        ),
    });

    if settings.database.provider == DatabaseProvider::Postgres {
        results.push(match &credentials.db_password {
            Some(_) => CheckResult::ok("DB_PASSWORD", "set"),
            None => CheckResult::error("DB_PASSWORD", "not set", "Set with: export DB_PASSWORD='...'"),
        });
    }

    results
}

/// Check the Gmail recipient and OAuth files.
fn check_gmail(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if settings.gmail.recipient.trim().is_empty() {
        results.push(CheckResult::error(
            "Recipient",
            "not set",
            "Add recipient = \"you@example.com\" to the [gmail] section",
        ));
    } else {
        results.push(CheckResult::ok("Recipient", &settings.gmail.recipient));
    }

    let secrets = settings.gmail_credentials_path();
    let token = settings.gmail_token_path();
    results.push(if secrets.exists() {
        CheckResult::ok("Client secrets", &format!("{}", secrets.display()))
    } else if token.exists() {
        CheckResult::warning(
            "Client secrets",
            &format!("{} missing", secrets.display()),
            "Existing token works until it can no longer be refreshed",
        )
    } else {
        CheckResult::error(
            "Client secrets",
            &format!("{} missing", secrets.display()),
            "Download Desktop app OAuth credentials from the Google Cloud console",
        )
    });

    results.push(if token.exists() {
        CheckResult::ok("Token", &format!("{}", token.display()))
    } else {
        CheckResult::warning(
            "Token",
            "not authorized yet",
            "Run: forecast-assistant auth",
        )
    });

    results
}

/// Connect to the forecast store and count open forecasts.
async fn check_database(settings: &Settings, credentials: &Credentials) -> CheckResult {
    let name = match settings.database.provider {
        DatabaseProvider::Postgres => "Postgres",
        DatabaseProvider::Sqlite => "SQLite",
    };

    let store = match create_store(settings, credentials) {
        Ok(store) => store,
        Err(e) => return CheckResult::error(name, &e.to_string(), "Check the [database] section"),
    };

    match store.unresolved_forecasts().await {
        Ok(forecasts) => CheckResult::ok(name, &format!("{} open forecast(s)", forecasts.len())),
        Err(e) => CheckResult::error(
            name,
            &e.to_string(),
            "Check the [database] section, HOST and DB_PASSWORD",
        ),
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: forecast-assistant config edit",
        )
    }
}

/// Show only the ends of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("short"), "****");
        assert_eq!(mask("sk-abcdefghijklmnop1234"), "sk-abcd...1234");
    }

    #[test]
    fn test_credentials_checks() {
        let settings = Settings::default();
        let results = check_credentials(&settings, &Credentials::default());

        let statuses: Vec<_> = results.iter().map(|r| (r.name.as_str(), &r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("OPENAI_API_KEY", &CheckStatus::Error),
                ("AskNews", &CheckStatus::Warning),
                ("DB_PASSWORD", &CheckStatus::Error),
            ]
        );
    }

    #[tokio::test]
    async fn test_sqlite_database_check() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.database.provider = DatabaseProvider::Sqlite;
        settings.database.sqlite_path = dir.path().join("f.db").to_string_lossy().to_string();

        let result = check_database(&settings, &Credentials::default()).await;
        assert_eq!(result.status, CheckStatus::Ok);
        assert_eq!(result.message, "0 open forecast(s)");
    }
}
