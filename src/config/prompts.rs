//! Prompt templates for the forecast assistant.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub digest: DigestPrompts,
    /// Instructions for the four routed agents.
    pub agents: AgentPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for the daily digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestPrompts {
    /// Static template the forecasts and emails are appended to.
    pub template: String,
}

impl Default for DigestPrompts {
    fn default() -> Self {
        Self {
            template: r#"You are my forecasting assistant. I keep a log of probabilistic forecasts and subscribe to several news letters.

Below you will find my open (unresolved) forecasts followed by today's news emails.

Your job:
1. Read the emails and pick out the stories that bear on one or more of my forecasts.
2. For each relevant forecast, summarize the new information in two or three sentences and say whether it should move my probability up or down, and roughly how much.
3. Briefly list any other important news that does not touch my forecasts.
4. Suggest new questions worth forecasting if the news raises any.

Keep it concise and skimmable. When you are done, send me the summary with the send_email tool, using a short and informative subject."#
                .to_string(),
        }
    }
}

/// Instructions for the routed agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPrompts {
    pub main: String,
    /// Query agent instruction. `{{schema}}` is replaced with the database description.
    pub query: String,
    pub news: String,
    pub bayes: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            main: r#"You are to understand the user's request and call a tool to transfer the request to the agent that is most suitable to handle it. You may ask the user for more information to help you decide which agent is most suitable. Do not make unreasonable assumptions on behalf of the user.
If the request is about recent news on an event or a forecast, transfer to the News agent.
If the user wants help calculating a Bayesian posterior, transfer to the Bayes agent.
If the user asks about their forecasts, forecast points or aggregate statistics of their forecasts, transfer to the Query agent.
If another agent has referred the user back to you, get more information from the user before returning them to the correct agent."#
                .to_string(),

            query: r#"You are to answer the user's question about their forecasts, forecast points, or aggregate statistics truthfully. To help you, you have the user's database. Write a query that gives you the information you need and pass it to the execute_query function. Use calculate_brier_scores to see how the points of a single forecast would score under either resolution.
The database has the following structure:
{{schema}}
If the information you have is not enough, transfer back to the Main agent to obtain more information."#
                .to_string(),

            news: r#"You are to determine what news the user is interested in finding. Based on that understanding, create a query and pass it to the get_news function. Use the "nl" method for natural-language questions and "kw" for short keyword searches.
If the information you have is not enough to perform the news search, transfer back to the Main agent to obtain more information."#
                .to_string(),

            bayes: r#"You are to determine the user's likelihood, evidence, and prior from their request and pass them to the calc_posterior function to help the user determine an appropriate forecast update.
If you are unable to parse the user's likelihood, evidence and prior, transfer back to the Main agent to obtain more information."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        // Store custom variables
        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let digest_path = custom_path.join("digest.toml");
            if digest_path.exists() {
                let content = std::fs::read_to_string(&digest_path)?;
                prompts.digest = toml::from_str(&content)?;
            }

            let agents_path = custom_path.join("agents.toml");
            if agents_path.exists() {
                let content = std::fs::read_to_string(&agents_path)?;
                prompts.agents = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
