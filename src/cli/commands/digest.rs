//! Digest command: summarize the news against open forecasts and email it.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Credentials, Prompts, Settings};
use crate::digest::{load_template, Composition, DigestReport, Dispatch, Summarizer};
use crate::forecasts::create_store;
use crate::llm::create_model;
use crate::mail::GmailClient;
use anyhow::Result;
use std::sync::Arc;

/// Run the digest command.
pub async fn run_digest(
    count: Option<u32>,
    label: Option<String>,
    dry_run: bool,
    settings: Settings,
) -> Result<()> {
    let credentials = Credentials::from_env();
    if let Err(e) = preflight::check(Operation::Digest, &settings, &credentials) {
        Output::error(&format!("{}", e));
        Output::info("Run 'forecast-assistant doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let template = load_template(&settings, &prompts)?;

    let store = create_store(&settings, &credentials)?;
    let model = create_model(&settings.llm, &credentials)?;
    let mailer = Arc::new(GmailClient::from_settings(&settings));

    let mut digest_settings = settings.digest.clone();
    if let Some(n) = count {
        digest_settings.email_count = n;
    }
    let label = label.unwrap_or_else(|| settings.gmail.label.clone());

    let summarizer = Summarizer::new(store, mailer, model, template)
        .with_settings(digest_settings)
        .with_label(label.as_str())
        .with_max_tokens(settings.llm.max_tokens)
        .with_dry_run(dry_run);

    let spinner = Output::spinner(&format!("Summarizing '{}' emails against open forecasts...", label));
    let result = summarizer.run().await;
    spinner.finish_and_clear();

    print_report(&result?);
    Ok(())
}

fn print_report(report: &DigestReport) {
    Output::header("Forecast digest");
    Output::kv("Forecasts", &report.forecast_count.to_string());
    Output::kv("Emails", &report.email_count.to_string());
    Output::kv("Subject", &report.email.subject);
    if report.composition == Composition::PlainText {
        Output::kv("Composed", "from reply text (no send_email call)");
    }
    println!();

    match &report.dispatch {
        Dispatch::Sent(receipt) => {
            Output::success(&format!("Digest sent (message {}).", receipt.id));
        }
        Dispatch::Failed(reason) => {
            Output::warning(&format!("Digest was composed but not sent: {}", reason));
        }
        Dispatch::Skipped => {
            Output::info("Dry run, nothing was sent.");
            println!("\n{}\n", report.email.body);
        }
    }
}
