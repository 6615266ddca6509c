//! AskNews API client.

use super::{NewsQuery, NewsSource};
use crate::config::{Credentials, NewsSettings};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    as_string: Option<String>,
}

/// News source backed by AskNews, authenticated with client credentials.
pub struct AskNewsClient {
    http: Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    token_url: String,
    scopes: Vec<String>,
}

impl std::fmt::Debug for AskNewsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AskNewsClient")
            .field("client_id", &self.client_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl AskNewsClient {
    pub fn new(client_id: &str, client_secret: &str, settings: &NewsSettings) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token_url: settings.token_url.clone(),
            scopes: settings.scopes.clone(),
        }
    }

    /// Build a client from `ASK_CLIENT_ID` / `ASK_CLIENT_SECRET`.
    pub fn from_credentials(credentials: &Credentials, settings: &NewsSettings) -> Result<Self> {
        match (&credentials.ask_client_id, &credentials.ask_client_secret) {
            (Some(id), Some(secret)) => Ok(Self::new(id, secret, settings)),
            _ => Err(AssistantError::Config(
                "ASK_CLIENT_ID and ASK_CLIENT_SECRET must be set for news search".to_string(),
            )),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let scope = self.scopes.join(" ");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", scope.as_str())])
            .send()
            .await
            .map_err(|e| AssistantError::News(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::News(format!(
                "AskNews authentication failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::News(format!("Invalid token response: {}", e)))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl NewsSource for AskNewsClient {
    #[instrument(skip(self), fields(query = %query.query, method = %query.method))]
    async fn search(&self, query: &NewsQuery) -> Result<String> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{}/v1/news/search", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("query", query.query.clone()),
                ("n_articles", query.article_count.to_string()),
                ("return_type", "string".to_string()),
                ("method", query.method.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AssistantError::News(format!("Search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::News(format!(
                "AskNews search failed ({}): {}",
                status, body
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::News(format!("Invalid search response: {}", e)))?;

        let text = result.as_string.unwrap_or_default();
        debug!("AskNews returned {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::SearchMethod;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn settings(base: &str) -> NewsSettings {
        NewsSettings {
            api_base: base.to_string(),
            token_url: format!("{}/oauth2/token", base),
            ..NewsSettings::default()
        }
    }

    #[tokio::test]
    async fn test_search_returns_as_string() {
        let router = Router::new()
            .route(
                "/oauth2/token",
                post(|| async { Json(json!({"access_token": "tok", "token_type": "bearer"})) }),
            )
            .route(
                "/v1/news/search",
                get(
                    |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                        let authorized = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            == Some("Bearer tok");
                        if !authorized {
                            return (StatusCode::UNAUTHORIZED, Json(Value::Null));
                        }
                        let text = format!(
                            "[1] {} ({} articles, {})",
                            params["query"], params["n_articles"], params["method"]
                        );
                        (StatusCode::OK, Json(json!({"as_string": text, "as_dicts": null})))
                    },
                ),
            );
        let base = spawn(router).await;

        let client = AskNewsClient::new("id", "secret", &settings(&base));
        let text = client
            .search(&NewsQuery {
                query: "Google antitrust".to_string(),
                method: SearchMethod::Keyword,
                article_count: 10,
            })
            .await
            .unwrap();

        assert_eq!(text, "[1] Google antitrust (10 articles, kw)");
    }

    #[tokio::test]
    async fn test_auth_failure_is_news_error() {
        let router = Router::new().route(
            "/oauth2/token",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad client") }),
        );
        let base = spawn(router).await;

        let client = AskNewsClient::new("id", "wrong", &settings(&base));
        let err = client
            .search(&NewsQuery {
                query: "x".to_string(),
                method: SearchMethod::NaturalLanguage,
                article_count: 10,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::News(_)));
    }

    #[test]
    fn test_missing_credentials() {
        let err = AskNewsClient::from_credentials(&Credentials::default(), &NewsSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("ASK_CLIENT_ID"));
    }
}
