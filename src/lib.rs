// Core modules
pub mod advisor;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod models;
pub mod risk;
pub mod state;
pub mod stats;
pub mod strategy;

// Re-export commonly used types
pub use config::Settings;
pub use engine::{Bot, BotError, DecisionLoop, TickOutcome};
pub use exchange::{BinanceClient, Exchange, PaperExchange};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
