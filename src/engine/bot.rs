use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::advisor::Advisor;
use crate::config::Settings;
use crate::engine::decision_loop::{DecisionLoop, SharedState, StatusSnapshot};
use crate::exchange::Exchange;
use crate::models::TradeRecord;
use crate::stats::StatsSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("decision loop failed: {0}")]
    LoopFailed(String),
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<(DecisionLoop, anyhow::Result<()>)>,
}

/// Owning handle for one bot instance.
///
/// Wraps the decision loop in a spawned task and exposes snapshot reads
/// that never block the tick. `start` on a running bot is rejected;
/// `stop` on a stopped bot is a no-op.
pub struct Bot {
    engine: Option<DecisionLoop>,
    running: Option<Running>,
    shared: Arc<SharedState>,
}

impl Bot {
    pub fn new(settings: Settings, exchange: Arc<dyn Exchange>, advisor: Advisor) -> Self {
        let engine = DecisionLoop::new(settings, exchange, advisor);
        let shared = engine.shared();
        Self {
            engine: Some(engine),
            running: None,
            shared,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the decision loop. Fails if a loop is already in flight.
    pub fn start(&mut self) -> Result<(), BotError> {
        if self.running.is_some() {
            return Err(BotError::AlreadyRunning);
        }
        // Only absent while a prior task owns it, which `running` tracks.
        let mut engine = self.engine.take().ok_or(BotError::AlreadyRunning)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let result = engine.run(shutdown_rx).await;
            (engine, result)
        });

        self.running = Some(Running {
            shutdown_tx,
            handle,
        });
        tracing::info!("Bot started");
        Ok(())
    }

    /// Signal shutdown and wait for the loop to persist and exit.
    pub async fn stop(&mut self) -> Result<(), BotError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The loop may already have exited on its own; send failure is fine.
        let _ = running.shutdown_tx.send(true);

        match running.handle.await {
            Ok((engine, result)) => {
                self.engine = Some(engine);
                result.map_err(|e| BotError::LoopFailed(e.to_string()))?;
            }
            Err(e) => return Err(BotError::LoopFailed(e.to_string())),
        }
        tracing::info!("Bot stopped");
        Ok(())
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats()
    }

    pub fn recent_trades(&self, limit: usize) -> Vec<TradeRecord> {
        self.shared.recent_trades(limit)
    }
}
