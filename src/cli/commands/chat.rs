//! Interactive chat with the forecast agents.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Credentials, Settings};
use crate::error::Result;
use crate::router::RouterServices;
use console::style;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Run the interactive chat command.
///
/// With `show_tools` set, hand-offs and tool calls are printed under each reply.
pub async fn run_chat(show_tools: bool, settings: Settings) -> Result<()> {
    let credentials = Credentials::from_env();
    if let Err(e) = preflight::check(Operation::Router, &settings, &credentials) {
        Output::error(&format!("{}", e));
        Output::info("Run 'forecast-assistant doctor' for detailed diagnostics.");
        return Err(e);
    }

    let services = RouterServices::from_settings(&settings, &credentials)?;
    let mut session = services.session();

    println!("\n{}", style("Forecast Assistant").bold().cyan());
    println!(
        "{}\n",
        style("Ask about your forecasts, or 'exit' to quit. Use 'clear' to start over.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.reset();
            Output::info("Conversation cleared. Back to the Main agent.");
            continue;
        }

        match session.run_turn(input).await {
            Ok(outcome) => {
                debug!(
                    "Turn finished after {} model call(s) at {}",
                    outcome.iterations, outcome.agent
                );
                if show_tools {
                    for (from, to) in &outcome.handoffs {
                        Output::handoff(from.name(), to.name());
                    }
                    for call in &outcome.tool_calls {
                        Output::tool_call(&call.to_string(), &call.result);
                    }
                }
                Output::agent_reply(outcome.agent.name(), &outcome.reply);
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}
