//! News search.
//!
//! The news agent looks up recent coverage through a [`NewsSource`].
//! [`AskNewsClient`] talks to the AskNews API.

mod asknews;

pub use asknews::AskNewsClient;

use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a news query string is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMethod {
    /// A sentence describing the event.
    #[default]
    #[serde(rename = "nl")]
    NaturalLanguage,
    /// Space-separated keywords.
    #[serde(rename = "kw")]
    Keyword,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::NaturalLanguage => "nl",
            SearchMethod::Keyword => "kw",
        }
    }
}

impl FromStr for SearchMethod {
    type Err = AssistantError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nl" | "natural" | "natural_language" => Ok(SearchMethod::NaturalLanguage),
            "kw" | "keyword" | "keywords" => Ok(SearchMethod::Keyword),
            other => Err(AssistantError::InvalidInput(format!(
                "Unknown search method '{}'. Use 'nl' or 'kw'.",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A news search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsQuery {
    pub query: String,
    #[serde(default)]
    pub method: SearchMethod,
    pub article_count: u32,
}

/// Trait for news providers.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Search recent articles and return them as one prompt-ready string.
    async fn search(&self, query: &NewsQuery) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// News source returning a fixed digest and recording queries.
    pub struct CannedNews {
        pub response: String,
        pub queries: Mutex<Vec<NewsQuery>>,
    }

    impl CannedNews {
        pub fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NewsSource for CannedNews {
        async fn search(&self, query: &NewsQuery) -> Result<String> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.response.clone())
        }
    }
}
