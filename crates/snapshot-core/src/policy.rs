//! Notification gating. The pipeline asks the policy whether the computed
//! snapshots warrant a notification; the shipped policy always says yes.
//! Threshold gating stays available as an injectable predicate so it can
//! be re-enabled without touching the pipeline.

use crate::types::TickerSnapshot;

/// Decides whether a run's snapshots warrant a notification.
pub trait NotifyPolicy: Send + Sync {
    fn should_notify(&self, snapshots: &[TickerSnapshot]) -> bool;
}

/// Shipped policy: every completed run notifies.
pub struct AlwaysNotify;

impl NotifyPolicy for AlwaysNotify {
    fn should_notify(&self, _snapshots: &[TickerSnapshot]) -> bool {
        true
    }
}

/// Drop gate: notify only when at least one ticker's daily or weekly
/// change fell to or below its threshold. Currently unused.
pub struct ThresholdGate {
    pub daily_threshold: f64,
    pub weekly_threshold: f64,
}

impl NotifyPolicy for ThresholdGate {
    fn should_notify(&self, snapshots: &[TickerSnapshot]) -> bool {
        snapshots.iter().any(|s| {
            below_threshold(s.daily_change_pct, self.daily_threshold)
                || below_threshold(s.weekly_change_pct, self.weekly_threshold)
        })
    }
}

pub fn below_threshold(change: f64, threshold: f64) -> bool {
    change <= threshold
}
