//! Daily forecast digest.
//!
//! Collects labelled news emails and open forecasts, asks the model once for a
//! summary, and emails the result to the user.

mod prompt;

pub use prompt::{render_prompt, resolve_outbound, send_email_tool, Composition, SEND_EMAIL_TOOL};

use crate::config::{DigestSettings, Prompts, Settings};
use crate::error::Result;
use crate::forecasts::ForecastStore;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::mail::{DeliveryReceipt, Mailer, OutboundEmail};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Outcome of the send step.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Sent(DeliveryReceipt),
    /// Sending failed; the error was logged and not retried.
    Failed(String),
    /// Dry run; nothing was sent.
    Skipped,
}

/// What a digest run produced.
#[derive(Debug, Clone)]
pub struct DigestReport {
    pub forecast_count: usize,
    pub email_count: usize,
    pub email: OutboundEmail,
    pub composition: Composition,
    pub dispatch: Dispatch,
}

/// Load the digest template: `digest.prompt_file` when set, else the configured prompts.
pub fn load_template(settings: &Settings, prompts: &Prompts) -> Result<String> {
    match &settings.digest.prompt_file {
        Some(path) => Ok(std::fs::read_to_string(Settings::expand_path(path))?),
        None => Ok(prompts.render_with_custom(&prompts.digest.template, &HashMap::new())),
    }
}

/// Single-shot digest pipeline.
pub struct Summarizer {
    store: Arc<dyn ForecastStore>,
    mailer: Arc<dyn Mailer>,
    model: Arc<dyn ChatModel>,
    template: String,
    settings: DigestSettings,
    label: String,
    max_tokens: u32,
    dry_run: bool,
}

impl Summarizer {
    pub fn new(
        store: Arc<dyn ForecastStore>,
        mailer: Arc<dyn Mailer>,
        model: Arc<dyn ChatModel>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            model,
            template: template.into(),
            settings: DigestSettings::default(),
            label: "news".to_string(),
            max_tokens: 3084,
            dry_run: false,
        }
    }

    pub fn with_settings(mut self, settings: DigestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the pipeline once.
    #[instrument(skip(self), fields(label = %self.label, model = %self.model.model()))]
    pub async fn run(&self) -> Result<DigestReport> {
        let emails = self
            .mailer
            .list_recent(self.settings.email_count, &self.label)
            .await?;
        let forecasts = self.store.unresolved_forecasts().await?;
        info!(
            "Summarizing {} forecast(s) against {} email(s)",
            forecasts.len(),
            emails.len()
        );

        let prompt = render_prompt(
            &self.template,
            &forecasts,
            &emails,
            self.settings.snippet_chars,
        );
        debug!("Digest prompt is {} chars", prompt.len());

        let reply = self
            .model
            .complete(ChatRequest {
                system: None,
                messages: vec![ChatMessage::user(prompt)],
                tools: vec![send_email_tool()],
                max_tokens: self.max_tokens,
            })
            .await?;

        let (email, composition) = resolve_outbound(&reply, &self.settings.fallback_subject)?;

        let dispatch = if self.dry_run {
            Dispatch::Skipped
        } else {
            match self.mailer.send(&email).await {
                Ok(receipt) => {
                    info!("Digest sent: {}", receipt.id);
                    Dispatch::Sent(receipt)
                }
                Err(e) => {
                    error!("Failed to send digest: {}", e);
                    Dispatch::Failed(e.to_string())
                }
            }
        };

        Ok(DigestReport {
            forecast_count: forecasts.len(),
            email_count: emails.len(),
            email,
            composition,
            dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use crate::forecasts::SqliteForecastStore;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::ModelReply;
    use crate::mail::testing::{email, RecordingMailer};
    use crate::mail::EmailMessage;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn store() -> Arc<SqliteForecastStore> {
        let store = SqliteForecastStore::in_memory(true).unwrap();
        store
            .insert_forecast(
                "Will Google be ordered to divest Chrome by 2026?",
                "tech, antitrust",
                Utc.with_ymd_and_hms(2024, 10, 9, 8, 0, 0).unwrap(),
                None,
            )
            .unwrap();
        Arc::new(store)
    }

    fn inbox() -> Vec<EmailMessage> {
        vec![
            email("m1", "brief@news.example", "Morning Brief", "DOJ proposes Chrome divestiture."),
            email("m2", "markets@news.example", "Markets", "Stocks flat."),
        ]
    }

    #[tokio::test]
    async fn test_digest_sends_tool_call_email_once() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::tool_call(
            "call_1",
            SEND_EMAIL_TOOL,
            json!({"subject": "Daily Digest", "body": "Summary text"}),
        )]));
        let mailer = Arc::new(RecordingMailer::new(inbox()[..1].to_vec()));
        let store = store();
        store
            .insert_forecast(
                "Will the EU fine Apple under the DMA in 2025?",
                "tech, regulation",
                Utc.with_ymd_and_hms(2024, 11, 2, 9, 30, 0).unwrap(),
                None,
            )
            .unwrap();

        let report = Summarizer::new(store, mailer.clone(), model.clone(), "Summarize.")
            .run()
            .await
            .unwrap();

        assert_eq!(report.composition, Composition::ToolCall);
        assert_eq!(report.forecast_count, 2);
        assert_eq!(report.email_count, 1);
        assert!(matches!(report.dispatch, Dispatch::Sent(_)));
        assert_eq!(
            mailer.sent(),
            vec![OutboundEmail {
                subject: "Daily Digest".to_string(),
                body: "Summary text".to_string(),
            }]
        );

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 3084);
        assert_eq!(requests[0].tools, vec![send_email_tool()]);
        match &requests[0].messages[0] {
            ChatMessage::User(prompt) => {
                assert!(prompt.starts_with("Summarize.\n\nForecasts:\n- Will Google"));
                assert!(prompt.contains("\n- Will the EU fine Apple"));
                assert!(prompt.contains("\nEmails:\n- From: brief@news.example | Subject: Morning Brief |"));
                assert_eq!(prompt.matches("\n- ").count(), 3);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_digest_falls_back_to_reply_text() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text("Plain summary")]));
        let mailer = Arc::new(RecordingMailer::new(inbox()));

        let report = Summarizer::new(store(), mailer.clone(), model, "Summarize.")
            .run()
            .await
            .unwrap();

        assert_eq!(report.composition, Composition::PlainText);
        assert_eq!(mailer.sent()[0].subject, "Forecasts summary");
        assert_eq!(mailer.sent()[0].body, "Plain summary");
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_raised() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text("Plain summary")]));
        let mailer = Arc::new(RecordingMailer::rejecting(inbox()));

        let report = Summarizer::new(store(), mailer, model, "Summarize.")
            .run()
            .await
            .unwrap();

        assert!(matches!(report.dispatch, Dispatch::Failed(_)));
    }

    #[tokio::test]
    async fn test_model_failure_sends_nothing() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let mailer = Arc::new(RecordingMailer::new(inbox()));

        let err = Summarizer::new(store(), mailer.clone(), model, "Summarize.")
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::Model(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_and_email_count() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text("Plain summary")]));
        let mailer = Arc::new(RecordingMailer::new(inbox()));

        let report = Summarizer::new(store(), mailer.clone(), model, "Summarize.")
            .with_settings(DigestSettings {
                email_count: 1,
                ..DigestSettings::default()
            })
            .with_dry_run(true)
            .run()
            .await
            .unwrap();

        assert_eq!(report.email_count, 1);
        assert_eq!(report.dispatch, Dispatch::Skipped);
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn test_load_template_prefers_prompt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Custom digest prompt").unwrap();

        let mut settings = Settings::default();
        assert!(load_template(&settings, &Prompts::default())
            .unwrap()
            .contains("send_email"));

        settings.digest.prompt_file = Some(path.to_string_lossy().to_string());
        assert_eq!(
            load_template(&settings, &Prompts::default()).unwrap(),
            "Custom digest prompt"
        );
    }
}
