//! Running performance counters derived from executed trades.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{OrderSide, TradeRecord, TradeResult};
use crate::strategy::ReferencePrices;

/// Read-only view handed out to status consumers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    /// Percentage of total trades that closed with a profit.
    pub win_rate: f64,
    pub last_buy_price: Option<f64>,
    pub last_sell_price: Option<f64>,
    pub advisor_rejections: u64,
    pub order_failures: u64,
    pub persist_failures: u64,
}

/// Counters plus the append-only trade log.
///
/// Counters survive restarts through the persisted state; the in-memory
/// trade log does not (per-run history only, the log file keeps the rest).
#[derive(Debug, Default)]
pub struct StatsTracker {
    total_trades: u64,
    wins: u64,
    losses: u64,
    trades: Vec<TradeRecord>,
    advisor_rejections: u64,
    order_failures: u64,
    persist_failures: u64,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild counters from persisted totals.
    pub fn restore(total_trades: u64, wins: u64, losses: u64) -> Self {
        Self {
            total_trades,
            wins,
            losses,
            ..Self::default()
        }
    }

    /// Record an executed buy.
    pub fn record_buy(&mut self, price: f64, amount: f64) -> &TradeRecord {
        self.total_trades += 1;
        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            side: OrderSide::Buy,
            price,
            amount,
            profit_pct: None,
            result: None,
        });
        self.trades.last().unwrap()
    }

    /// Record an executed sell, classified against the entry price that
    /// opened the position (when one is on record).
    pub fn record_sell(&mut self, price: f64, amount: f64, entry_price: Option<f64>) -> &TradeRecord {
        self.total_trades += 1;

        let profit_pct = entry_price.map(|entry| (price - entry) / entry * 100.0);
        let result = profit_pct.map(|pct| {
            if pct > 0.0 {
                self.wins += 1;
                TradeResult::Win
            } else {
                self.losses += 1;
                TradeResult::Loss
            }
        });

        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            side: OrderSide::Sell,
            price,
            amount,
            profit_pct,
            result,
        });
        self.trades.last().unwrap()
    }

    pub fn record_advisor_rejection(&mut self) {
        self.advisor_rejections += 1;
    }

    pub fn record_order_failure(&mut self) {
        self.order_failures += 1;
    }

    pub fn record_persist_failure(&mut self) {
        self.persist_failures += 1;
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn wins(&self) -> u64 {
        self.wins
    }

    pub fn losses(&self) -> u64 {
        self.losses
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64 * 100.0
        }
    }

    /// The most recent `limit` trades, oldest first.
    pub fn recent_trades(&self, limit: usize) -> Vec<TradeRecord> {
        let start = self.trades.len().saturating_sub(limit);
        self.trades[start..].to_vec()
    }

    pub fn snapshot(&self, refs: &ReferencePrices) -> StatsSnapshot {
        StatsSnapshot {
            total_trades: self.total_trades,
            wins: self.wins,
            losses: self.losses,
            win_rate: self.win_rate(),
            last_buy_price: refs.last_buy_price,
            last_sell_price: refs.last_sell_price,
            advisor_rejections: self.advisor_rejections,
            order_failures: self.order_failures,
            persist_failures: self.persist_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_then_winning_sell() {
        let mut stats = StatsTracker::new();
        stats.record_buy(100.0, 0.001);
        let sell = stats.record_sell(101.0, 0.001, Some(100.0));

        assert_eq!(sell.result, Some(TradeResult::Win));
        assert!((sell.profit_pct.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(stats.total_trades(), 2);
        assert_eq!(stats.wins(), 1);
        assert_eq!(stats.losses(), 0);
        assert_eq!(stats.win_rate(), 50.0);
    }

    #[test]
    fn test_losing_sell() {
        let mut stats = StatsTracker::new();
        stats.record_buy(100.0, 0.001);
        let sell = stats.record_sell(97.0, 0.001, Some(100.0));

        assert_eq!(sell.result, Some(TradeResult::Loss));
        assert_eq!(stats.losses(), 1);
    }

    #[test]
    fn test_break_even_counts_as_loss() {
        let mut stats = StatsTracker::new();
        stats.record_buy(100.0, 0.001);
        let sell = stats.record_sell(100.0, 0.001, Some(100.0));
        assert_eq!(sell.result, Some(TradeResult::Loss));
    }

    #[test]
    fn test_sell_without_entry_is_unclassified() {
        // Reconciliation can hand us an asset position with no recorded
        // entry; selling it out produces a trade with no result.
        let mut stats = StatsTracker::new();
        let sell = stats.record_sell(100.0, 0.001, None);

        assert_eq!(sell.result, None);
        assert_eq!(sell.profit_pct, None);
        assert_eq!(stats.total_trades(), 1);
        assert_eq!(stats.wins() + stats.losses(), 0);
    }

    #[test]
    fn test_win_rate_without_trades_is_zero() {
        assert_eq!(StatsTracker::new().win_rate(), 0.0);
    }

    #[test]
    fn test_restore_from_persisted_counters() {
        let stats = StatsTracker::restore(10, 6, 4);
        assert_eq!(stats.total_trades(), 10);
        assert_eq!(stats.win_rate(), 60.0);
        assert!(stats.recent_trades(10).is_empty());
    }

    #[test]
    fn test_recent_trades_returns_tail() {
        let mut stats = StatsTracker::new();
        for i in 0..5 {
            stats.record_buy(100.0 + i as f64, 0.001);
        }
        let recent = stats.recent_trades(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].price, 103.0);
        assert_eq!(recent[1].price, 104.0);
    }

    #[test]
    fn test_snapshot_reflects_counters_and_refs() {
        let mut stats = StatsTracker::new();
        stats.record_buy(100.0, 0.001);
        stats.record_sell(102.0, 0.001, Some(100.0));
        stats.record_advisor_rejection();

        let refs = ReferencePrices {
            last_buy_price: Some(100.0),
            last_sell_price: Some(102.0),
        };
        let snap = stats.snapshot(&refs);

        assert_eq!(snap.total_trades, 2);
        assert_eq!(snap.wins, 1);
        assert_eq!(snap.last_sell_price, Some(102.0));
        assert_eq!(snap.advisor_rejections, 1);
    }
}
