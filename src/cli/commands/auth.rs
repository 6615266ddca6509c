//! Auth command: authorize Gmail access through the browser.

use crate::cli::Output;
use crate::config::Settings;
use crate::mail::GmailAuth;
use anyhow::Result;

/// Run the Gmail consent flow and store the token.
pub async fn run_auth(settings: Settings) -> Result<()> {
    let credentials_path = settings.gmail_credentials_path();
    if !credentials_path.exists() {
        Output::error(&format!("OAuth client secrets not found at {:?}", credentials_path));
        Output::info("Download them from the Google Cloud console (Desktop app credentials).");
        anyhow::bail!("missing Gmail client secrets");
    }

    if let Some(parent) = settings.gmail_token_path().parent() {
        std::fs::create_dir_all(parent)?;
    }

    let auth = GmailAuth::new(credentials_path, settings.gmail_token_path(), true);
    let token = auth.consent().await?;

    Output::success(&format!("Gmail authorized. Token saved to {:?}", auth.token_path()));
    if token.refresh_token.is_none() {
        Output::warning("No refresh token was issued; you will need to re-run 'forecast-assistant auth' when it expires.");
    }
    Ok(())
}
