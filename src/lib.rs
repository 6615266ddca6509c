//! Forecast Assistant - news digests and a multi-agent chat for personal forecasts
//!
//! A CLI and WebSocket service that keeps a forecaster informed about the
//! questions they still have open.
//!
//! # Overview
//!
//! The assistant can:
//! - Read labelled news emails from Gmail and summarize them against open forecasts
//! - Email the summary back through the Gmail API
//! - Answer questions through a team of agents that query the forecast database,
//!   search the news and run Bayesian updates
//!
//! # Architecture
//!
//! - `config` - Settings, credentials and prompts
//! - `llm` - Chat model abstraction (OpenAI, Anthropic)
//! - `forecasts` - Forecast database access (Postgres, SQLite)
//! - `mail` - Gmail authorization, reading and sending
//! - `news` - News search (AskNews)
//! - `digest` - Single-shot digest pipeline
//! - `router` - Agent state machine and tools
//!
//! # Example
//!
//! ```rust,no_run
//! use forecast_assistant::config::{Credentials, Settings};
//! use forecast_assistant::router::RouterServices;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let services = RouterServices::from_settings(&settings, &Credentials::from_env())?;
//!
//!     let mut session = services.session();
//!     let outcome = session.run_turn("What is my Brier score on forecast 42?").await?;
//!     println!("{}: {}", outcome.agent, outcome.reply);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod forecasts;
pub mod llm;
pub mod mail;
pub mod news;
pub mod openai;
pub mod router;

pub use error::{AssistantError, Result};
