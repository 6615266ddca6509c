//! Gmail OAuth for an installed application.
//!
//! Reads Google client secrets (`credentials.json`) and keeps an
//! authorized-user token (`token.json`) next to it. Expired tokens are
//! refreshed; when no usable token exists the browser consent flow runs on a
//! loopback redirect, unless interactive consent is disabled.

use crate::error::{AssistantError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Scopes requested for reading labelled mail and sending the digest.
pub const GMAIL_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
];

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);
const EXPIRY_SKEW_SECS: i64 = 60;

/// Client secrets downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    #[serde(alias = "web")]
    pub installed: InstalledApp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::Auth(format!(
                "Cannot read Gmail client secrets at {:?}: {}",
                path, e
            ))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| AssistantError::Auth(format!("Invalid client secrets file: {}", e)))
    }
}

/// Persisted authorized-user token, in the layout Google's client libraries write.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("token", &"***")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl StoredToken {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Ignoring unreadable token file {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved Gmail token to {:?}", path);
        Ok(())
    }

    /// A token without an expiry is treated as valid.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty()
            && self
                .expiry
                .map_or(true, |expiry| expiry > now + ChronoDuration::seconds(EXPIRY_SKEW_SECS))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, secrets: &InstalledApp, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            token_uri: secrets.token_uri.clone(),
            client_id: Some(secrets.client_id.clone()),
            client_secret: Some(secrets.client_secret.clone()),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_else(|| GMAIL_SCOPES.iter().map(|s| s.to_string()).collect()),
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// Supplies Gmail access tokens, refreshing or re-consenting as needed.
pub struct GmailAuth {
    client: Client,
    credentials_path: PathBuf,
    token_path: PathBuf,
    interactive: bool,
}

impl GmailAuth {
    pub fn new(credentials_path: PathBuf, token_path: PathBuf, interactive: bool) -> Self {
        Self {
            client: Client::new(),
            credentials_path,
            token_path,
            interactive,
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Return a valid access token, reading `token.json` on every call.
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<String> {
        let stored = StoredToken::load(&self.token_path)?;

        if let Some(token) = stored.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        if let Some(stored) = stored.filter(|t| t.refresh_token.is_some()) {
            match self.refresh(&stored).await {
                Ok(refreshed) => {
                    refreshed.save(&self.token_path)?;
                    return Ok(refreshed.token);
                }
                Err(e) => warn!("Gmail token refresh failed: {}", e),
            }
        }

        if !self.interactive {
            return Err(AssistantError::Auth(format!(
                "No valid Gmail token at {:?}. Run `forecast-assistant auth` to authorize.",
                self.token_path
            )));
        }

        Ok(self.consent().await?.token)
    }

    /// Run the browser consent flow and persist the resulting token.
    pub async fn consent(&self) -> Result<StoredToken> {
        let secrets = ClientSecrets::load(&self.credentials_path)?.installed;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
        let state = uuid::Uuid::new_v4().simple().to_string();
        let authorize_url = build_authorize_url(&secrets, &redirect_uri, &state)?;

        info!("Waiting for Gmail consent on {}", redirect_uri);
        eprintln!(
            "Please visit this URL to authorize Gmail access:\n\n  {}\n",
            authorize_url
        );

        let code = receive_loopback_code(listener, &state, CONSENT_TIMEOUT).await?;
        let token = self.exchange_code(&secrets, &code, &redirect_uri).await?;
        token.save(&self.token_path)?;
        info!("Gmail authorization stored at {:?}", self.token_path);

        Ok(token)
    }

    async fn refresh(&self, stored: &StoredToken) -> Result<StoredToken> {
        let secrets = match (&stored.client_id, &stored.client_secret) {
            (Some(client_id), Some(client_secret)) => InstalledApp {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                auth_uri: default_auth_uri(),
                token_uri: stored.token_uri.clone(),
            },
            _ => ClientSecrets::load(&self.credentials_path)?.installed,
        };
        let refresh_token = stored.refresh_token.clone().unwrap_or_default();

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
        ];
        let response = self.client.post(&secrets.token_uri).form(&form).send().await?;
        let token = parse_token_response(response).await?;

        debug!("Refreshed Gmail access token");
        Ok(token.into_stored(&secrets, Some(refresh_token)))
    }

    async fn exchange_code(
        &self,
        secrets: &InstalledApp,
        code: &str,
        redirect_uri: &str,
    ) -> Result<StoredToken> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];
        let response = self.client.post(&secrets.token_uri).form(&form).send().await?;
        let token = parse_token_response(response).await?;
        Ok(token.into_stored(secrets, None))
    }
}

fn build_authorize_url(secrets: &InstalledApp, redirect_uri: &str, state: &str) -> Result<Url> {
    let scope = GMAIL_SCOPES.join(" ");
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| AssistantError::Auth(format!("Invalid auth URI: {}", e)))
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AssistantError::Auth(format!(
            "Token request failed ({}): {}",
            status, body
        )));
    }
    Ok(response.json().await?)
}

async fn receive_loopback_code(
    listener: TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> Result<String> {
    let (mut stream, _) = tokio::time::timeout(timeout, listener.accept())
        .await
        .map_err(|_| AssistantError::Auth("Timed out waiting for browser consent".to_string()))??;

    let mut buffer = vec![0_u8; 8192];
    let bytes_read = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..bytes_read]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| AssistantError::Auth("Malformed consent callback".to_string()))?;

    let outcome = parse_code_from_redirect(path, expected_state);

    let body = match &outcome {
        Ok(_) => "<html><body><h2>Authorization complete</h2><p>You can close this tab.</p></body></html>",
        Err(_) => "<html><body><h2>Authorization failed</h2><p>Return to the terminal for details.</p></body></html>",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;

    outcome
}

/// Extract the authorization code from the redirect request target.
fn parse_code_from_redirect(path: &str, expected_state: &str) -> Result<String> {
    let query = path.split_once('?').map(|(_, q)| q).unwrap_or_default();
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AssistantError::Auth(format!("Consent denied: {}", error)));
    }
    if state.as_deref() != Some(expected_state) {
        return Err(AssistantError::Auth("OAuth state mismatch".to_string()));
    }
    code.ok_or_else(|| AssistantError::Auth("Missing authorization code in callback".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            token: "ya29.test".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: default_token_uri(),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            scopes: GMAIL_SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry,
        }
    }

    #[test]
    fn test_parse_code_from_redirect() {
        let code = parse_code_from_redirect("/?state=abc&code=4%2F0Aabc&scope=x", "abc").unwrap();
        assert_eq!(code, "4/0Aabc");
    }

    #[test]
    fn test_parse_code_rejects_state_mismatch() {
        let err = parse_code_from_redirect("/?state=other&code=x", "abc").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn test_parse_code_reports_denial() {
        let err = parse_code_from_redirect("/?error=access_denied&state=abc", "abc").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_token_freshness() {
        let now = Utc::now();
        assert!(token(None).is_fresh(now));
        assert!(token(Some(now + ChronoDuration::minutes(30))).is_fresh(now));
        assert!(!token(Some(now + ChronoDuration::seconds(30))).is_fresh(now));
        assert!(!token(Some(now - ChronoDuration::minutes(5))).is_fresh(now));
    }

    #[test]
    fn test_reads_google_token_layout() {
        let raw = r#"{"token": "ya29.a0", "refresh_token": "1//0g", "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id.apps.googleusercontent.com", "client_secret": "s",
            "scopes": ["https://www.googleapis.com/auth/gmail.modify"], "expiry": "2024-10-03T09:00:00.000000Z"}"#;
        let token: StoredToken = serde_json::from_str(raw).unwrap();
        assert_eq!(token.token, "ya29.a0");
        assert!(token.expiry.is_some());
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_without_network() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        token(Some(Utc::now() + ChronoDuration::hours(1)))
            .save(&token_path)
            .unwrap();

        let auth = GmailAuth::new(dir.path().join("credentials.json"), token_path, false);
        assert_eq!(auth.access_token().await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_token_file_is_reread_on_each_call() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        token(Some(Utc::now() + ChronoDuration::hours(1)))
            .save(&token_path)
            .unwrap();

        let auth = GmailAuth::new(dir.path().join("credentials.json"), token_path.clone(), false);
        assert_eq!(auth.access_token().await.unwrap(), "ya29.test");

        let mut replaced = token(Some(Utc::now() + ChronoDuration::hours(1)));
        replaced.token = "ya29.second".to_string();
        replaced.save(&token_path).unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "ya29.second");

        std::fs::remove_file(&token_path).unwrap();
        assert!(matches!(
            auth.access_token().await.unwrap_err(),
            AssistantError::Auth(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_token_without_consent_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let auth = GmailAuth::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
            false,
        );

        let err = auth.access_token().await.unwrap_err();
        assert!(matches!(err, AssistantError::Auth(_)));
    }

    #[test]
    fn test_authorize_url_carries_state_and_scopes() {
        let secrets = InstalledApp {
            client_id: "id".to_string(),
            client_secret: "s".to_string(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        };
        let url = build_authorize_url(&secrets, "http://127.0.0.1:5555/", "xyz").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        assert!(pairs.iter().any(|(k, v)| k == "scope" && v.contains("gmail.send")));
    }
}
