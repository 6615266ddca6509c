//! CLI output formatting utilities.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print an agent's reply, prefixed with the agent name.
    pub fn agent_reply(agent: &str, text: &str) {
        println!("\n{} {}\n", style(format!("{}:", agent)).blue().bold(), text);
    }

    /// Print a hand-off between agents.
    pub fn handoff(from: &str, to: &str) {
        println!("  {} {} {} {}", style("~").dim(), style(from).dim(), style("->").dim(), style(to).dim());
    }

    /// Print a tool call and a preview of its result.
    pub fn tool_call(call: &str, result: &str) {
        println!("  {} {}", style("[tool]").magenta(), style(call).dim());
        println!("    {}", style(preview(result, 160)).dim());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Single-line preview, truncated on a char boundary.
fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("a\nb", 10), "a b");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }
}
