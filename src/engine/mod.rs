//! Orchestration: the tick loop, position reconciliation, and the
//! outward-facing bot handle.

pub mod bot;
pub mod decision_loop;
pub mod reconcile;

pub use bot::{Bot, BotError};
pub use decision_loop::{DecisionLoop, SharedState, StatusSnapshot, TickOutcome};
pub use reconcile::{reconcile, Reconciliation};
