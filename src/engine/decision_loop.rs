use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

use crate::advisor::Advisor;
use crate::config::Settings;
use crate::engine::reconcile::reconcile;
use crate::exchange::{Exchange, ExchangeError};
use crate::models::{Balances, OrderFill, OrderSide, PositionSide, TradeRecord};
use crate::risk::RiskOverlay;
use crate::state::{PersistedState, StateStore};
use crate::stats::{StatsSnapshot, StatsTracker};
use crate::strategy::{ReferencePrices, SignalEngine};

/// Upper bound on any single exchange call. The loop skips the tick's
/// decision phase on expiry instead of stalling the cycle.
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only view of the loop for status consumers.
///
/// Replaced wholesale after each tick, so a concurrent reader always sees a
/// consistent record: never a position from one tick paired with reference
/// prices from another.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub position: PositionSide,
    /// Last successfully fetched price; stale while `degraded` is set.
    pub current_price: Option<f64>,
    pub balances: Option<Balances>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Price fetch failed on the most recent tick; decisions are suspended
    /// but cached data is still served.
    pub degraded: bool,
    /// Holding a position with no anchoring reference price; all actions
    /// are suppressed until a trade establishes one.
    pub awaiting_reference: bool,
    pub tick: u64,
}

/// Snapshots shared between the running loop and outside readers.
///
/// The loop is the only writer; readers get clones. Whole-value swaps keep
/// every read internally consistent.
pub struct SharedState {
    status: RwLock<StatusSnapshot>,
    stats: RwLock<StatsSnapshot>,
    trades: RwLock<Vec<TradeRecord>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            status: RwLock::new(StatusSnapshot::default()),
            stats: RwLock::new(StatsSnapshot::default()),
            trades: RwLock::new(Vec::new()),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.read().unwrap().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.read().unwrap().clone()
    }

    /// The most recent `limit` executed trades, oldest first.
    pub fn recent_trades(&self, limit: usize) -> Vec<TradeRecord> {
        let trades = self.trades.read().unwrap();
        let start = trades.len().saturating_sub(limit);
        trades[start..].to_vec()
    }
}

/// What one pass of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Price unavailable; decision phase skipped.
    Degraded,
    /// No action proposed, or none possible yet.
    Held,
    /// Baseline signal proposed a trade and the advisor vetoed it.
    AdvisorVetoed,
    /// Order placed and filled.
    Executed(OrderSide),
    /// Order placement failed; retried on the next natural tick.
    OrderFailed,
}

/// The orchestrating control loop.
///
/// Exactly one tick is in flight at a time, and the loop is the sole
/// writer of position, reference prices and persisted state; everything
/// concurrent with it only reads snapshots.
pub struct DecisionLoop {
    settings: Settings,
    exchange: Arc<dyn Exchange>,
    advisor: Advisor,
    engine: SignalEngine,
    overlay: RiskOverlay,
    store: StateStore,
    stats: StatsTracker,
    position: PositionSide,
    refs: ReferencePrices,
    high_water_mark: Option<f64>,
    last_price: Option<f64>,
    last_balances: Option<Balances>,
    tick_count: u64,
    shared: Arc<SharedState>,
}

impl DecisionLoop {
    pub fn new(settings: Settings, exchange: Arc<dyn Exchange>, advisor: Advisor) -> Self {
        let engine = SignalEngine::new(
            settings.buy_pct,
            settings.sell_pct,
            settings.first_buy_policy,
        );
        let overlay = RiskOverlay::new(settings.stop_loss_pct, settings.trailing_stop_pct);
        let store = StateStore::new(&settings.state_file);

        Self {
            settings,
            exchange,
            advisor,
            engine,
            overlay,
            store,
            stats: StatsTracker::new(),
            position: PositionSide::Cash,
            refs: ReferencePrices::default(),
            high_water_mark: None,
            last_price: None,
            last_balances: None,
            tick_count: 0,
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Snapshots readable while the loop runs.
    pub fn shared(&self) -> Arc<SharedState> {
        self.shared.clone()
    }

    pub fn position(&self) -> PositionSide {
        self.position
    }

    pub fn refs(&self) -> ReferencePrices {
        self.refs
    }

    /// Restore persisted state and reconcile the believed position against
    /// real account balances before the first tick.
    pub async fn startup(&mut self) -> anyhow::Result<()> {
        let state = self.store.load().await;
        self.position = state.position;
        self.refs = state.refs();
        self.stats = StatsTracker::restore(state.total_trades, state.wins, state.losses);

        match self.fetch_balances().await {
            Ok(balances) => {
                self.last_balances = Some(balances);
                self.apply_reconciliation(balances.asset);
            }
            Err(e) => {
                // Startup proceeds on the believed position; the next
                // scheduled reconcile (or operator restart) heals any drift.
                tracing::warn!(error = %e, "Startup reconciliation skipped, balances unavailable");
            }
        }

        // Best effort: the true peak since entry is not persisted, so the
        // trailing stop restarts from what is knowable now.
        if self.position == PositionSide::Asset && self.refs.last_buy_price.is_some() {
            if let Ok(price) = self.fetch_price().await {
                self.last_price = Some(price);
                self.high_water_mark = self.overlay.seed_on_restart(price, &self.refs);
            }
        }

        tracing::info!(
            position = ?self.position,
            last_buy = ?self.refs.last_buy_price,
            last_sell = ?self.refs.last_sell_price,
            total_trades = self.stats.total_trades(),
            "Engine ready"
        );

        self.publish(true);
        Ok(())
    }

    /// One full pass: price → reconcile → risk + signal → advisor →
    /// execute → persist.
    pub async fn tick(&mut self) -> TickOutcome {
        self.tick_count += 1;

        let price = match self.fetch_price().await {
            Ok(price) => price,
            Err(e) => {
                // A stale price must not drive a trade decision. Status
                // readers keep getting the cached snapshot.
                tracing::warn!(
                    error = %e,
                    tick = self.tick_count,
                    "Price unavailable, skipping decision phase"
                );
                self.publish_degraded();
                return TickOutcome::Degraded;
            }
        };
        self.last_price = Some(price);

        if self.reconcile_due() {
            match self.fetch_balances().await {
                Ok(balances) => {
                    self.last_balances = Some(balances);
                    self.apply_reconciliation(balances.asset);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Mid-run reconciliation skipped");
                }
            }
        }

        // Risk overlays take precedence over the baseline signal and are
        // never subject to advisor veto. They are anchored on the recorded
        // entry price, so with no reference on the books every action is
        // suppressed, forced exits included.
        if !self.awaiting_reference() {
            if let Some(trigger) = self.overlay.check(
                price,
                self.position,
                &self.refs,
                &mut self.high_water_mark,
            ) {
                tracing::warn!(%trigger, price, "Risk overlay forcing exit");
                return self.execute(OrderSide::Sell, price).await;
            }
        }

        let eval = self.engine.evaluate(price, self.position, &self.refs);
        tracing::debug!(
            action = ?eval.action,
            target = eval.target_price,
            price,
            position = ?self.position,
            "Signal evaluated"
        );

        let side = match eval.action {
            crate::models::Action::Buy => OrderSide::Buy,
            crate::models::Action::Sell => OrderSide::Sell,
            crate::models::Action::Hold => {
                self.publish(true);
                return TickOutcome::Held;
            }
        };

        let recommendation = self
            .advisor
            .recommend(eval.action, price, &self.stats.snapshot(&self.refs))
            .await;
        if !recommendation.approve {
            tracing::info!(
                action = ?eval.action,
                note = %recommendation.note,
                "Advisor vetoed trade, holding this tick"
            );
            self.stats.record_advisor_rejection();
            self.publish(true);
            return TickOutcome::AdvisorVetoed;
        }

        self.execute(side, price).await
    }

    /// Run until the shutdown flag flips, then persist and stop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.startup().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.tick().await;

            // Observe cancellation promptly after the tick's awaits rather
            // than sleeping out a full interval first.
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.check_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        if let Err(e) = self.store.save(&self.persisted()).await {
            tracing::error!(error = %e, "Failed to persist state at shutdown");
        }
        self.publish(false);
        tracing::info!("Decision loop stopped");
        Ok(())
    }

    async fn execute(&mut self, side: OrderSide, price: f64) -> TickOutcome {
        let amount = self.settings.trade_amount;
        let order = tokio::time::timeout(
            IO_TIMEOUT,
            self.exchange.place_order(&self.settings.pair, side, amount),
        )
        .await
        .unwrap_or(Err(ExchangeError::Timeout));

        let fill = match order {
            Ok(fill) => fill,
            Err(e) => {
                // Position and references are untouched; the next natural
                // tick retries rather than hammering a failing exchange.
                tracing::warn!(
                    error = %e,
                    side = side.as_str(),
                    price,
                    "Order failed, no state change"
                );
                self.stats.record_order_failure();
                self.publish(true);
                return TickOutcome::OrderFailed;
            }
        };

        self.apply_fill(side, fill);

        if let Err(e) = self.store.save(&self.persisted()).await {
            // The trade already happened on the exchange; only bookkeeping
            // is degraded. This must reach an operator, not a debug log.
            tracing::error!(
                error = %e,
                side = side.as_str(),
                fill_price = fill.price,
                "ALERT: trade executed but state save failed; on-disk state is stale"
            );
            self.stats.record_persist_failure();
        }

        self.publish(true);
        TickOutcome::Executed(side)
    }

    fn apply_fill(&mut self, side: OrderSide, fill: OrderFill) {
        match side {
            OrderSide::Buy => {
                self.stats.record_buy(fill.price, fill.amount);
                self.refs.last_buy_price = Some(fill.price);
                self.position = PositionSide::Asset;
                self.high_water_mark = self.overlay.seed_on_entry(fill.price);
                tracing::info!(
                    price = fill.price,
                    amount = fill.amount,
                    "BUY executed, now holding {}",
                    self.settings.pair.base
                );
            }
            OrderSide::Sell => {
                let record = self
                    .stats
                    .record_sell(fill.price, fill.amount, self.refs.last_buy_price);
                tracing::info!(
                    price = fill.price,
                    amount = fill.amount,
                    profit_pct = ?record.profit_pct,
                    result = ?record.result,
                    "SELL executed, now holding {}",
                    self.settings.pair.quote
                );
                self.refs.last_sell_price = Some(fill.price);
                self.position = PositionSide::Cash;
                self.high_water_mark = None;
            }
        }
    }

    fn reconcile_due(&self) -> bool {
        let every = self.settings.reconcile_every_ticks;
        every > 0 && self.tick_count % every as u64 == 0
    }

    fn apply_reconciliation(&mut self, observed_asset_balance: f64) {
        let result = reconcile(
            self.position,
            observed_asset_balance,
            self.settings.dust_threshold,
        );

        if !result.drift_detected {
            tracing::debug!(position = ?self.position, "Reconciliation: no drift");
            return;
        }

        tracing::warn!(
            believed = ?self.position,
            corrected = ?result.corrected,
            observed_asset_balance,
            "Position drift detected, correcting to match account balances"
        );
        self.position = result.corrected;

        match result.corrected {
            PositionSide::Asset => {
                // The entry price is unknown if no buy is on record; the
                // engine then waits for a reference instead of inventing
                // one, and the trailing stop stays unarmed.
                if self.refs.last_buy_price.is_none() {
                    tracing::warn!(
                        "Holding {} with no recorded entry price; awaiting reference before acting",
                        self.settings.pair.base
                    );
                    self.high_water_mark = None;
                } else {
                    let seed_price = self.last_price.unwrap_or(0.0);
                    self.high_water_mark = if seed_price > 0.0 {
                        self.overlay.seed_on_restart(seed_price, &self.refs)
                    } else {
                        None
                    };
                }
            }
            PositionSide::Cash => {
                self.high_water_mark = None;
            }
        }
    }

    async fn fetch_price(&self) -> Result<f64, ExchangeError> {
        tokio::time::timeout(IO_TIMEOUT, self.exchange.get_price(&self.settings.pair))
            .await
            .unwrap_or(Err(ExchangeError::Timeout))
    }

    async fn fetch_balances(&self) -> Result<Balances, ExchangeError> {
        tokio::time::timeout(IO_TIMEOUT, self.exchange.get_balances(&self.settings.pair))
            .await
            .unwrap_or(Err(ExchangeError::Timeout))
    }

    fn persisted(&self) -> PersistedState {
        PersistedState {
            position: self.position,
            last_buy_price: self.refs.last_buy_price,
            last_sell_price: self.refs.last_sell_price,
            total_trades: self.stats.total_trades(),
            wins: self.stats.wins(),
            losses: self.stats.losses(),
            updated_at: None,
        }
    }

    fn awaiting_reference(&self) -> bool {
        match self.position {
            PositionSide::Asset => self.refs.last_buy_price.is_none(),
            PositionSide::Cash => false,
        }
    }

    /// Swap in fresh snapshots after the tick's writes are done.
    fn publish(&self, running: bool) {
        let status = StatusSnapshot {
            running,
            position: self.position,
            current_price: self.last_price,
            balances: self.last_balances,
            last_updated: Some(Utc::now()),
            degraded: false,
            awaiting_reference: self.awaiting_reference(),
            tick: self.tick_count,
        };
        *self.shared.status.write().unwrap() = status;
        *self.shared.stats.write().unwrap() = self.stats.snapshot(&self.refs);
        *self.shared.trades.write().unwrap() = self.stats.recent_trades(100);
    }

    fn publish_degraded(&self) {
        let mut status = self.shared.status.read().unwrap().clone();
        status.running = true;
        status.degraded = true;
        status.tick = self.tick_count;
        status.last_updated = Some(Utc::now());
        *self.shared.status.write().unwrap() = status;
    }
}
