//! Router function schemas and implementations.

use super::state::{AgentKind, RouterFunction};
use crate::error::{AssistantError, Result};
use crate::forecasts::{brier_scores, ForecastStore};
use crate::llm::ToolSpec;
use crate::news::{NewsQuery, NewsSource, SearchMethod};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Bayes' rule is undefined when the evidence has probability zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot have probabilities that are equal to 0")]
pub struct ZeroEvidence;

/// Posterior probability `likelihood * prior / evidence`.
pub fn calc_posterior(
    likelihood: f64,
    prior: f64,
    evidence: f64,
) -> std::result::Result<f64, ZeroEvidence> {
    if evidence == 0.0 {
        return Err(ZeroEvidence);
    }
    Ok(likelihood * prior / evidence)
}

/// A parsed call to a router function.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCall {
    Transfer(AgentKind),
    ExecuteQuery {
        query: String,
    },
    GetNews {
        query: String,
        method: SearchMethod,
    },
    CalcPosterior {
        likelihood: f64,
        prior: f64,
        evidence: f64,
    },
    CalculateBrierScores {
        forecast_id: i64,
    },
}

impl FunctionCall {
    /// Validate the model-supplied arguments for `function`.
    pub fn parse(function: RouterFunction, args: &Value) -> Result<Self> {
        let string_arg = |name: &str| {
            args[name]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| AssistantError::Router(format!("Missing '{}' argument", name)))
        };
        let number_arg = |name: &str| {
            args[name]
                .as_f64()
                .ok_or_else(|| AssistantError::Router(format!("Missing '{}' argument", name)))
        };

        match function {
            RouterFunction::TransferToMain => Ok(FunctionCall::Transfer(AgentKind::Main)),
            RouterFunction::TransferToNews => Ok(FunctionCall::Transfer(AgentKind::News)),
            RouterFunction::TransferToBayes => Ok(FunctionCall::Transfer(AgentKind::Bayes)),
            RouterFunction::TransferToQuery => Ok(FunctionCall::Transfer(AgentKind::Query)),
            RouterFunction::ExecuteQuery => Ok(FunctionCall::ExecuteQuery {
                query: string_arg("query")?,
            }),
            RouterFunction::GetNews => {
                let method = match args["method"].as_str() {
                    Some(method) => method.parse()?,
                    None => SearchMethod::default(),
                };
                Ok(FunctionCall::GetNews {
                    query: string_arg("query")?,
                    method,
                })
            }
            RouterFunction::CalcPosterior => Ok(FunctionCall::CalcPosterior {
                likelihood: number_arg("likelihood")?,
                prior: number_arg("prior")?,
                evidence: number_arg("evidence")?,
            }),
            RouterFunction::CalculateBrierScores => {
                let forecast_id = args["forecast_id"]
                    .as_i64()
                    .or_else(|| args["forecast_id"].as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| {
                        AssistantError::Router("Missing 'forecast_id' argument".to_string())
                    })?;
                Ok(FunctionCall::CalculateBrierScores { forecast_id })
            }
        }
    }
}

/// Tool schema offered to the model for `function`.
pub fn tool_spec(function: RouterFunction) -> ToolSpec {
    let no_args = json!({"type": "object", "properties": {}});

    let (description, parameters) = match function {
        RouterFunction::TransferToMain => (
            "Transfer the conversation back to the Main agent.",
            no_args,
        ),
        RouterFunction::TransferToNews => (
            "Transfer the conversation to the News agent, which searches recent news.",
            no_args,
        ),
        RouterFunction::TransferToBayes => (
            "Transfer the conversation to the Bayes agent, which calculates Bayesian posteriors.",
            no_args,
        ),
        RouterFunction::TransferToQuery => (
            "Transfer the conversation to the Query agent, which answers questions about the user's forecasts.",
            no_args,
        ),
        RouterFunction::ExecuteQuery => (
            "Execute a SQL query against the forecast database and return the resulting rows.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The SQL query to execute."}
                },
                "required": ["query"]
            }),
        ),
        RouterFunction::GetNews => (
            "Get recent news for an event or question.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The news event, as a sentence or keywords."},
                    "method": {
                        "type": "string",
                        "enum": ["nl", "kw"],
                        "description": "\"nl\" for a natural-language query, \"kw\" for a keyword search. Defaults to \"nl\"."
                    }
                },
                "required": ["query"]
            }),
        ),
        RouterFunction::CalcPosterior => (
            "Calculate the posterior probability with Bayes' rule: (likelihood * prior) / evidence.",
            json!({
                "type": "object",
                "properties": {
                    "likelihood": {"type": "number", "description": "Probability of observing the evidence if the outcome is true."},
                    "prior": {"type": "number", "description": "Prior probability of the outcome."},
                    "evidence": {"type": "number", "description": "Overall probability of observing the evidence."}
                },
                "required": ["likelihood", "prior", "evidence"]
            }),
        ),
        RouterFunction::CalculateBrierScores => (
            "Calculate the Brier score of every point forecast for a forecast, if it resolved Yes and if it resolved No.",
            json!({
                "type": "object",
                "properties": {
                    "forecast_id": {"type": "integer", "description": "The id of the forecast in forecast_v2."}
                },
                "required": ["forecast_id"]
            }),
        ),
    };

    ToolSpec {
        name: function.name().to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Backends the invokable functions run against.
pub struct RouterTools {
    store: Arc<dyn ForecastStore>,
    news: Option<Arc<dyn NewsSource>>,
    article_count: u32,
}

impl RouterTools {
    pub fn new(store: Arc<dyn ForecastStore>, news: Option<Arc<dyn NewsSource>>) -> Self {
        Self {
            store,
            news,
            article_count: 10,
        }
    }

    pub fn with_article_count(mut self, article_count: u32) -> Self {
        self.article_count = article_count;
        self
    }

    /// Run an invokable function and render its result for the model.
    pub async fn execute(&self, call: &FunctionCall) -> Result<String> {
        match call {
            FunctionCall::Transfer(kind) => Ok(format!("Transferred to {}.", kind)),
            FunctionCall::ExecuteQuery { query } => {
                info!("Executing model query: {}", query);
                Ok(self.store.run_query(query).await?.to_string())
            }
            FunctionCall::GetNews { query, method } => {
                let news = self.news.as_ref().ok_or_else(|| {
                    AssistantError::News(
                        "News search is not configured (set ASK_CLIENT_ID and ASK_CLIENT_SECRET)"
                            .to_string(),
                    )
                })?;
                let text = news
                    .search(&NewsQuery {
                        query: query.clone(),
                        method: *method,
                        article_count: self.article_count,
                    })
                    .await?;
                if text.trim().is_empty() {
                    Ok("No news found.".to_string())
                } else {
                    Ok(text)
                }
            }
            FunctionCall::CalcPosterior {
                likelihood,
                prior,
                evidence,
            } => Ok(match calc_posterior(*likelihood, *prior, *evidence) {
                Ok(posterior) => posterior.to_string(),
                Err(e) => e.to_string(),
            }),
            FunctionCall::CalculateBrierScores { forecast_id } => {
                let points = self.store.forecast_points(*forecast_id).await?;
                Ok(format_brier_scores(*forecast_id, &points))
            }
        }
    }
}

fn format_brier_scores(forecast_id: i64, points: &[f64]) -> String {
    if points.is_empty() {
        return format!("Forecast {} has no forecast points.", forecast_id);
    }

    let scores = brier_scores(points);
    let lines = points
        .iter()
        .zip(scores.resolves_yes.iter().zip(&scores.resolves_no))
        .enumerate()
        .map(|(i, (p, (yes, no)))| {
            format!("{}. p={:.3}: if Yes {:.4}, if No {:.4}", i + 1, p, yes, no)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Forecast {} has {} point(s).\nMean Brier score if it resolves Yes: {:.4}\nMean Brier score if it resolves No: {:.4}\n{}",
        forecast_id,
        points.len(),
        scores.mean_if_yes.unwrap_or_default(),
        scores.mean_if_no.unwrap_or_default(),
        lines
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecasts::SqliteForecastStore;
    use crate::news::testing::CannedNews;
    use chrono::{TimeZone, Utc};

    fn tools(news: Option<Arc<CannedNews>>) -> (RouterTools, Arc<SqliteForecastStore>) {
        let store = Arc::new(SqliteForecastStore::in_memory(true).unwrap());
        let created = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();
        let id = store
            .insert_forecast("Will Google be broken up by 2027?", "tech", created, None)
            .unwrap();
        store.insert_point(id, 0.2, created).unwrap();
        store.insert_point(id, 0.6, created + chrono::Duration::days(1)).unwrap();

        let news = news.map(|n| n as Arc<dyn NewsSource>);
        (RouterTools::new(store.clone(), news), store)
    }

    #[test]
    fn test_calc_posterior() {
        assert!((calc_posterior(0.8, 0.3, 0.5).unwrap() - 0.48).abs() < 1e-12);
        assert_eq!(calc_posterior(0.8, 0.3, 0.0), Err(ZeroEvidence));
        assert_eq!(
            ZeroEvidence.to_string(),
            "Cannot have probabilities that are equal to 0"
        );
    }

    #[test]
    fn test_posterior_is_monotonic_in_likelihood_and_prior() {
        let steps = [0.05, 0.1, 0.25, 0.4, 0.5, 0.75, 0.9, 1.0];
        for evidence in [0.1, 0.5, 1.0] {
            for fixed in steps {
                for pair in steps.windows(2) {
                    let (lo, hi) = (pair[0], pair[1]);
                    assert!(
                        calc_posterior(hi, fixed, evidence).unwrap()
                            > calc_posterior(lo, fixed, evidence).unwrap(),
                        "likelihood {} -> {} with prior {} and evidence {}",
                        lo, hi, fixed, evidence
                    );
                    assert!(
                        calc_posterior(fixed, hi, evidence).unwrap()
                            > calc_posterior(fixed, lo, evidence).unwrap(),
                        "prior {} -> {} with likelihood {} and evidence {}",
                        lo, hi, fixed, evidence
                    );
                }
            }
        }
    }

    #[test]
    fn test_parse_arguments() {
        let call = FunctionCall::parse(
            RouterFunction::GetNews,
            &json!({"query": "Google antitrust", "method": "kw"}),
        )
        .unwrap();
        assert_eq!(
            call,
            FunctionCall::GetNews {
                query: "Google antitrust".to_string(),
                method: SearchMethod::Keyword
            }
        );

        let call = FunctionCall::parse(RouterFunction::GetNews, &json!({"query": "q"})).unwrap();
        assert!(matches!(call, FunctionCall::GetNews { method: SearchMethod::NaturalLanguage, .. }));

        let call =
            FunctionCall::parse(RouterFunction::CalculateBrierScores, &json!({"forecast_id": "7"}))
                .unwrap();
        assert_eq!(call, FunctionCall::CalculateBrierScores { forecast_id: 7 });
    }

    #[test]
    fn test_parse_rejects_malformed_arguments() {
        assert!(FunctionCall::parse(RouterFunction::ExecuteQuery, &json!({})).is_err());
        assert!(FunctionCall::parse(
            RouterFunction::CalcPosterior,
            &json!({"likelihood": "high", "prior": 0.1, "evidence": 0.2})
        )
        .is_err());
        assert!(FunctionCall::parse(RouterFunction::GetNews, &json!({"query": "q", "method": "vector"}))
            .is_err());
        assert!(FunctionCall::parse(RouterFunction::ExecuteQuery, &json!("SELECT 1")).is_err());
    }

    #[test]
    fn test_tool_specs_are_named_after_functions() {
        for function in RouterFunction::ALL {
            let spec = tool_spec(function);
            assert_eq!(spec.name, function.name());
            assert_eq!(spec.parameters["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_execute_zero_evidence_is_a_result_not_a_failure() {
        let (tools, _) = tools(None);
        let result = tools
            .execute(&FunctionCall::CalcPosterior {
                likelihood: 0.5,
                prior: 0.5,
                evidence: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(result, "Cannot have probabilities that are equal to 0");
    }

    #[tokio::test]
    async fn test_execute_query_and_brier_scores() {
        let (tools, _) = tools(None);

        let rows = tools
            .execute(&FunctionCall::ExecuteQuery {
                query: "SELECT COUNT(*) AS open FROM forecast_v2 WHERE resolved IS NULL".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(rows, "open\n1\n(1 row)");

        let scores = tools
            .execute(&FunctionCall::CalculateBrierScores { forecast_id: 1 })
            .await
            .unwrap();
        assert!(scores.starts_with("Forecast 1 has 2 point(s)."));
        assert!(scores.contains("Mean Brier score if it resolves Yes: 0.4000"));
        assert!(scores.contains("Mean Brier score if it resolves No: 0.2000"));

        let empty = tools
            .execute(&FunctionCall::CalculateBrierScores { forecast_id: 99 })
            .await
            .unwrap();
        assert_eq!(empty, "Forecast 99 has no forecast points.");
    }

    #[tokio::test]
    async fn test_execute_get_news() {
        let news = Arc::new(CannedNews::new("[1] DOJ seeks Chrome sale"));
        let (tools, _) = tools(Some(news.clone()));

        let text = tools
            .execute(&FunctionCall::GetNews {
                query: "Google breakup".to_string(),
                method: SearchMethod::NaturalLanguage,
            })
            .await
            .unwrap();

        assert_eq!(text, "[1] DOJ seeks Chrome sale");
        let queries = news.queries.lock().unwrap();
        assert_eq!(queries[0].article_count, 10);
        assert_eq!(queries[0].query, "Google breakup");
    }

    #[tokio::test]
    async fn test_get_news_without_source_is_news_error() {
        let (tools, _) = tools(None);
        let err = tools
            .execute(&FunctionCall::GetNews {
                query: "q".to_string(),
                method: SearchMethod::Keyword,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::News(_)));
    }
}
