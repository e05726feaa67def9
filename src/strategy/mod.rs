//! Threshold signal engine.
//!
//! Pure decision logic: given the observed price, the current position side
//! and the reference prices left by previous trades, propose a buy, sell, or
//! hold. Execution, risk overrides and advisor consultation live in the
//! engine module; nothing here has side effects.

use serde::{Deserialize, Serialize};

use crate::config::FirstBuyPolicy;
use crate::models::{Action, PositionSide};

/// Prices at which the most recent trade in each direction executed.
///
/// They anchor the opposite-direction target: the next buy is measured
/// against the last sell, the next sell against the last buy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferencePrices {
    pub last_buy_price: Option<f64>,
    pub last_sell_price: Option<f64>,
}

/// Result of one evaluation: the proposed action and the price that would
/// trigger the opposite-direction trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub action: Action,
    pub target_price: f64,
}

/// Pure threshold logic from price + position + references to a proposal.
///
/// Output is advisory only; the decision loop applies risk precedence and
/// actually executes.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    buy_pct: f64,
    sell_pct: f64,
    first_buy_policy: FirstBuyPolicy,
}

impl SignalEngine {
    pub fn new(buy_pct: f64, sell_pct: f64, first_buy_policy: FirstBuyPolicy) -> Self {
        Self {
            buy_pct,
            sell_pct,
            first_buy_policy,
        }
    }

    /// Evaluate the current tick.
    ///
    /// Boundary behavior is inclusive on both sides (`<=` / `>=`) so that a
    /// price landing exactly on a threshold triggers deterministically.
    ///
    /// With no anchor for the active direction the engine is in
    /// awaiting-reference mode: it holds, except for the very first buy
    /// under the `Immediate` policy.
    pub fn evaluate(
        &self,
        current_price: f64,
        position: PositionSide,
        refs: &ReferencePrices,
    ) -> Evaluation {
        match position {
            PositionSide::Cash => match refs.last_sell_price {
                Some(last_sell) => {
                    let target = last_sell * (1.0 - self.buy_pct);
                    let action = if current_price <= target {
                        Action::Buy
                    } else {
                        Action::Hold
                    };
                    Evaluation {
                        action,
                        target_price: target,
                    }
                }
                None => {
                    // No sell has ever executed. Whether to enter at the
                    // first opportunity is an operator choice, not a guess.
                    let action = match self.first_buy_policy {
                        FirstBuyPolicy::Immediate => Action::Buy,
                        FirstBuyPolicy::Wait => Action::Hold,
                    };
                    Evaluation {
                        action,
                        target_price: current_price,
                    }
                }
            },
            PositionSide::Asset => match refs.last_buy_price {
                Some(last_buy) => {
                    let target = last_buy * (1.0 + self.sell_pct);
                    let action = if current_price >= target {
                        Action::Sell
                    } else {
                        Action::Hold
                    };
                    Evaluation {
                        action,
                        target_price: target,
                    }
                }
                // Holding the asset with no entry price on record (drift
                // correction with no trade history). Hold until a trade
                // establishes an anchor.
                None => Evaluation {
                    action: Action::Hold,
                    target_price: current_price,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(buy_pct: f64, sell_pct: f64) -> SignalEngine {
        SignalEngine::new(buy_pct, sell_pct, FirstBuyPolicy::Immediate)
    }

    #[test]
    fn test_buy_exactly_at_threshold() {
        // last sell 100, buy_pct 1% -> trigger at 99.0 inclusive
        let refs = ReferencePrices {
            last_buy_price: None,
            last_sell_price: Some(100.0),
        };
        let eval = engine(0.01, 0.01).evaluate(99.0, PositionSide::Cash, &refs);
        assert_eq!(eval.action, Action::Buy);
        assert!((eval.target_price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_hold_just_above_buy_threshold() {
        let refs = ReferencePrices {
            last_buy_price: None,
            last_sell_price: Some(100.0),
        };
        let eval = engine(0.01, 0.01).evaluate(99.01, PositionSide::Cash, &refs);
        assert_eq!(eval.action, Action::Hold);
    }

    #[test]
    fn test_sell_exactly_at_target() {
        let refs = ReferencePrices {
            last_buy_price: Some(100.0),
            last_sell_price: None,
        };
        let eval = engine(0.01, 0.01).evaluate(101.0, PositionSide::Asset, &refs);
        assert_eq!(eval.action, Action::Sell);
        assert!((eval.target_price - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_hold_below_sell_target() {
        let refs = ReferencePrices {
            last_buy_price: Some(100.0),
            last_sell_price: None,
        };
        let eval = engine(0.01, 0.02).evaluate(101.0, PositionSide::Asset, &refs);
        assert_eq!(eval.action, Action::Hold);
        assert!((eval.target_price - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_buy_immediate_policy() {
        let refs = ReferencePrices::default();
        let eval = engine(0.01, 0.01).evaluate(43000.0, PositionSide::Cash, &refs);
        assert_eq!(eval.action, Action::Buy);
        assert_eq!(eval.target_price, 43000.0);
    }

    #[test]
    fn test_first_buy_wait_policy_holds() {
        let refs = ReferencePrices::default();
        let engine = SignalEngine::new(0.01, 0.01, FirstBuyPolicy::Wait);
        let eval = engine.evaluate(43000.0, PositionSide::Cash, &refs);
        assert_eq!(eval.action, Action::Hold);
    }

    #[test]
    fn test_holding_asset_without_entry_price_holds() {
        // Reconciliation can put the bot in the asset position with no trade
        // history; the engine must suppress action until a real anchor exists.
        let refs = ReferencePrices::default();
        let eval = engine(0.01, 0.01).evaluate(43000.0, PositionSide::Asset, &refs);
        assert_eq!(eval.action, Action::Hold);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let refs = ReferencePrices {
            last_buy_price: Some(42000.0),
            last_sell_price: Some(43500.0),
        };
        let engine = engine(0.015, 0.02);
        let first = engine.evaluate(42950.0, PositionSide::Cash, &refs);
        for _ in 0..10 {
            assert_eq!(engine.evaluate(42950.0, PositionSide::Cash, &refs), first);
        }
    }
}
