//! Risk overlays that can override the baseline threshold signal.
//!
//! Stop-loss and trailing-stop only protect an open asset position; neither
//! can ever force a buy. A trigger takes precedence over whatever the signal
//! engine proposed for the tick.

use crate::models::PositionSide;
use crate::strategy::ReferencePrices;

/// Why the overlay forced an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTrigger {
    StopLoss,
    TrailingStop,
}

impl std::fmt::Display for RiskTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTrigger::StopLoss => write!(f, "stop-loss"),
            RiskTrigger::TrailingStop => write!(f, "trailing-stop"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskOverlay {
    stop_loss_pct: Option<f64>,
    trailing_stop_pct: Option<f64>,
}

impl RiskOverlay {
    pub fn new(stop_loss_pct: Option<f64>, trailing_stop_pct: Option<f64>) -> Self {
        Self {
            stop_loss_pct,
            trailing_stop_pct,
        }
    }

    pub fn trailing_enabled(&self) -> bool {
        self.trailing_stop_pct.is_some()
    }

    /// High-water mark to use after entering the asset position.
    pub fn seed_on_entry(&self, entry_price: f64) -> Option<f64> {
        self.trailing_stop_pct.map(|_| entry_price)
    }

    /// High-water mark to use on restart. The true historical peak is not
    /// persisted, so the best available seed is the larger of the restart
    /// price and the recorded entry price. Documented lossy behavior.
    pub fn seed_on_restart(&self, current_price: f64, refs: &ReferencePrices) -> Option<f64> {
        self.trailing_stop_pct.map(|_| {
            refs.last_buy_price
                .map_or(current_price, |entry| entry.max(current_price))
        })
    }

    /// Evaluate the overlays for one tick, raising the high-water mark as a
    /// side effect while the trailing stop is armed.
    ///
    /// Returns the trigger that forces a sell, if any. Stop-loss is checked
    /// first; when both would fire on the same tick the harder stop wins the
    /// log line, the forced sell is the same either way.
    ///
    /// Both stops are anchored on the recorded entry price. The caller must
    /// not consult the overlay while the position has no entry on record;
    /// an unanchored trailing stop would otherwise arm itself on the first
    /// observed price.
    pub fn check(
        &self,
        current_price: f64,
        position: PositionSide,
        refs: &ReferencePrices,
        high_water_mark: &mut Option<f64>,
    ) -> Option<RiskTrigger> {
        if position != PositionSide::Asset {
            return None;
        }

        if let (Some(stop_loss), Some(entry)) = (self.stop_loss_pct, refs.last_buy_price) {
            if current_price <= entry * (1.0 - stop_loss) {
                return Some(RiskTrigger::StopLoss);
            }
        }

        if let Some(trail) = self.trailing_stop_pct {
            let peak = match high_water_mark {
                Some(peak) => {
                    if current_price > *peak {
                        *peak = current_price;
                    }
                    *peak
                }
                None => {
                    *high_water_mark = Some(current_price);
                    current_price
                }
            };

            if current_price <= peak * (1.0 - trail) {
                return Some(RiskTrigger::TrailingStop);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs_with_entry(entry: f64) -> ReferencePrices {
        ReferencePrices {
            last_buy_price: Some(entry),
            last_sell_price: None,
        }
    }

    #[test]
    fn test_stop_loss_triggers_at_threshold() {
        let overlay = RiskOverlay::new(Some(0.03), None);
        let refs = refs_with_entry(100.0);
        let mut hwm = None;

        // 97.0 is exactly -3%: inclusive boundary fires
        assert_eq!(
            overlay.check(97.0, PositionSide::Asset, &refs, &mut hwm),
            Some(RiskTrigger::StopLoss)
        );
        assert_eq!(overlay.check(97.5, PositionSide::Asset, &refs, &mut hwm), None);
    }

    #[test]
    fn test_stop_loss_inactive_in_cash_position() {
        let overlay = RiskOverlay::new(Some(0.03), None);
        let refs = refs_with_entry(100.0);
        let mut hwm = None;
        assert_eq!(overlay.check(50.0, PositionSide::Cash, &refs, &mut hwm), None);
    }

    #[test]
    fn test_stop_loss_needs_entry_price() {
        let overlay = RiskOverlay::new(Some(0.03), None);
        let refs = ReferencePrices::default();
        let mut hwm = None;
        assert_eq!(overlay.check(10.0, PositionSide::Asset, &refs, &mut hwm), None);
    }

    #[test]
    fn test_trailing_stop_tracks_peak_then_fires() {
        let overlay = RiskOverlay::new(None, Some(0.015));
        let refs = refs_with_entry(100_000.0);
        let mut hwm = overlay.seed_on_entry(100_000.0);

        // Ride the price up; peak follows
        for price in [101_000.0, 102_000.0, 103_000.0, 104_000.0] {
            assert_eq!(overlay.check(price, PositionSide::Asset, &refs, &mut hwm), None);
        }
        assert_eq!(hwm, Some(104_000.0));

        // Small pullbacks hold
        assert_eq!(
            overlay.check(103_000.0, PositionSide::Asset, &refs, &mut hwm),
            None
        );
        // -1.5% from the 104k peak = 102,440
        assert_eq!(
            overlay.check(102_440.0, PositionSide::Asset, &refs, &mut hwm),
            Some(RiskTrigger::TrailingStop)
        );
    }

    #[test]
    fn test_peak_never_moves_down() {
        let overlay = RiskOverlay::new(None, Some(0.05));
        let refs = refs_with_entry(100.0);
        let mut hwm = overlay.seed_on_entry(100.0);

        overlay.check(110.0, PositionSide::Asset, &refs, &mut hwm);
        overlay.check(105.0, PositionSide::Asset, &refs, &mut hwm);
        assert_eq!(hwm, Some(110.0));
    }

    #[test]
    fn test_stop_loss_wins_over_trailing_on_same_tick() {
        let overlay = RiskOverlay::new(Some(0.03), Some(0.01));
        let refs = refs_with_entry(100.0);
        let mut hwm = Some(100.0);

        assert_eq!(
            overlay.check(95.0, PositionSide::Asset, &refs, &mut hwm),
            Some(RiskTrigger::StopLoss)
        );
    }

    #[test]
    fn test_restart_seed_uses_max_of_price_and_entry() {
        let overlay = RiskOverlay::new(None, Some(0.02));
        let refs = refs_with_entry(105.0);

        assert_eq!(overlay.seed_on_restart(100.0, &refs), Some(105.0));
        assert_eq!(overlay.seed_on_restart(110.0, &refs), Some(110.0));

        // No entry on record: seed from the restart price alone
        assert_eq!(
            overlay.seed_on_restart(100.0, &ReferencePrices::default()),
            Some(100.0)
        );
    }

    #[test]
    fn test_disabled_overlay_never_triggers() {
        let overlay = RiskOverlay::new(None, None);
        let refs = refs_with_entry(100.0);
        let mut hwm = None;
        assert_eq!(overlay.check(1.0, PositionSide::Asset, &refs, &mut hwm), None);
        assert_eq!(hwm, None);
    }
}
