//! crawlrelay - Rate-limited relay for a scraping API, an LLM completion API
//! and a Telegram bot webhook

pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod server;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{ProviderError, RelayError, Result};
pub use gate::{GateMode, GatePolicy, RateGate};
