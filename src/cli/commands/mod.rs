//! CLI command implementations.

mod auth;
mod chat;
mod config;
mod digest;
mod doctor;
mod serve;

pub use auth::run_auth;
pub use chat::run_chat;
pub use config::run_config;
pub use digest::run_digest;
pub use doctor::run_doctor;
pub use serve::{app, chunk_words, run_serve, DONE_SENTINEL};
