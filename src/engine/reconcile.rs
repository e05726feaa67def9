//! Position reconciliation against observed balances.
//!
//! The believed position is an advisory cache; the account balance is
//! ground truth. After a crash, a manual trade, or operator surgery on the
//! state file, the two can disagree. Reconciliation always corrects toward
//! what the account actually holds.

use crate::models::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub corrected: PositionSide,
    pub drift_detected: bool,
}

/// Derive the real position from the observed asset balance.
///
/// Balances at or below the dust threshold count as holding nothing:
/// exchanges leave sub-tradeable residue behind after sells, and that
/// residue must not flip the bot back into the asset position.
pub fn reconcile(
    believed: PositionSide,
    observed_asset_balance: f64,
    dust_threshold: f64,
) -> Reconciliation {
    let corrected = if observed_asset_balance > dust_threshold {
        PositionSide::Asset
    } else {
        PositionSide::Cash
    };

    Reconciliation {
        corrected,
        drift_detected: corrected != believed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_above_dust_means_asset() {
        let r = reconcile(PositionSide::Cash, 0.5, 0.0001);
        assert_eq!(r.corrected, PositionSide::Asset);
        assert!(r.drift_detected);
    }

    #[test]
    fn test_dust_residue_means_cash() {
        // 0.00005 BTC left over after a sell is residue, not a position
        let r = reconcile(PositionSide::Asset, 0.00005, 0.0001);
        assert_eq!(r.corrected, PositionSide::Cash);
        assert!(r.drift_detected);
    }

    #[test]
    fn test_exactly_at_dust_threshold_is_cash() {
        let r = reconcile(PositionSide::Cash, 0.0001, 0.0001);
        assert_eq!(r.corrected, PositionSide::Cash);
        assert!(!r.drift_detected);
    }

    #[test]
    fn test_agreement_reports_no_drift() {
        let r = reconcile(PositionSide::Asset, 1.0, 0.0001);
        assert_eq!(r.corrected, PositionSide::Asset);
        assert!(!r.drift_detected);
    }

    #[test]
    fn test_reconciling_twice_is_idempotent() {
        let first = reconcile(PositionSide::Cash, 0.5, 0.0001);
        assert!(first.drift_detected);

        let second = reconcile(first.corrected, 0.5, 0.0001);
        assert_eq!(second.corrected, first.corrected);
        assert!(!second.drift_detected);
    }
}
