//! OpenAI client construction.

use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Create an OpenAI client for the given key with a request timeout.
pub fn create_client_with_timeout(api_key: &str, timeout: Duration) -> Client<OpenAIConfig> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    Client::with_config(OpenAIConfig::new().with_api_key(api_key)).with_http_client(http_client)
}
