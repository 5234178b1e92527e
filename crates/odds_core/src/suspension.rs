//! Market suspension: inferred from whatever the bookmaker exposes.
//!
//! Signals, strongest first:
//!   - explicit flag or `suspendedReason` on the market / prices
//!   - event reports zero open markets (`totalMarketCount == 0`)
//!   - 1X2 prices zero or missing

use std::collections::{HashMap, HashSet};

use crate::odds::ThreeWay;

#[derive(Debug, Clone, PartialEq)]
pub enum SuspendReason {
    Flagged(Option<String>),
    NoMarkets,
    NoPrices,
    MissingPrices,
}

impl SuspendReason {
    pub fn describe(&self) -> String {
        match self {
            SuspendReason::Flagged(Some(r)) => r.clone(),
            SuspendReason::Flagged(None) => "suspended".to_string(),
            SuspendReason::NoMarkets => "no open markets".to_string(),
            SuspendReason::NoPrices => "all odds zero".to_string(),
            SuspendReason::MissingPrices => "incomplete odds".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    Active,
    Suspended(SuspendReason),
}

impl Suspension {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Suspension::Suspended(_))
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Suspension::Active => None,
            Suspension::Suspended(r) => Some(r.describe()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuspensionSignals {
    pub flagged:      bool,
    pub reason:       Option<String>,
    pub market_count: Option<u64>,
    pub odds:         ThreeWay,
}

impl SuspensionSignals {
    pub fn assess(&self) -> Suspension {
        if self.flagged || self.reason.is_some() {
            return Suspension::Suspended(SuspendReason::Flagged(self.reason.clone()));
        }
        if self.market_count == Some(0) {
            return Suspension::Suspended(SuspendReason::NoMarkets);
        }
        if self.odds.is_empty() {
            return Suspension::Suspended(SuspendReason::NoPrices);
        }
        if !self.odds.is_complete() {
            return Suspension::Suspended(SuspendReason::MissingPrices);
        }
        Suspension::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First time this key is seen.
    Appeared { suspended: bool },
    NowSuspended,
    Resumed,
    Unchanged,
}

/// Remembers the last suspension state per event key across poll cycles.
#[derive(Debug, Default)]
pub struct SuspensionTracker {
    last: HashMap<String, bool>,
}

impl SuspensionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, key: &str, suspended: bool) -> Transition {
        match self.last.insert(key.to_string(), suspended) {
            None => Transition::Appeared { suspended },
            Some(prev) if prev == suspended => Transition::Unchanged,
            Some(_) if suspended => Transition::NowSuspended,
            Some(_) => Transition::Resumed,
        }
    }

    /// Drop keys not present in the latest cycle; returns what was dropped.
    pub fn retain_seen(&mut self, seen: &HashSet<String>) -> Vec<String> {
        let gone: Vec<String> = self.last.keys().filter(|k| !seen.contains(*k)).cloned().collect();
        for k in &gone {
            self.last.remove(k);
        }
        gone
    }

    pub fn suspended_count(&self) -> usize {
        self.last.values().filter(|s| **s).count()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_odds() -> ThreeWay {
        ThreeWay { home: Some(1.9), draw: Some(3.3), away: Some(4.2) }
    }

    #[test]
    fn explicit_flag_beats_good_prices() {
        let s = SuspensionSignals {
            flagged: false,
            reason: Some("MatchStatusChange".to_string()),
            market_count: Some(40),
            odds: full_odds(),
        };
        assert_eq!(s.assess().reason().as_deref(), Some("MatchStatusChange"));
    }

    #[test]
    fn zero_market_count_is_suspended() {
        let s = SuspensionSignals { market_count: Some(0), odds: full_odds(), ..Default::default() };
        assert_eq!(s.assess(), Suspension::Suspended(SuspendReason::NoMarkets));
    }

    #[test]
    fn price_gaps_are_suspended() {
        let none = SuspensionSignals::default();
        assert_eq!(none.assess(), Suspension::Suspended(SuspendReason::NoPrices));

        let partial = SuspensionSignals {
            odds: ThreeWay { home: Some(2.0), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(partial.assess(), Suspension::Suspended(SuspendReason::MissingPrices));
    }

    #[test]
    fn complete_prices_without_flags_are_active() {
        let s = SuspensionSignals { market_count: Some(12), odds: full_odds(), ..Default::default() };
        assert_eq!(s.assess(), Suspension::Active);
        assert!(!s.assess().is_suspended());
    }

    #[test]
    fn tracker_reports_transitions() {
        let mut t = SuspensionTracker::new();
        assert_eq!(t.observe("sporty:1", false), Transition::Appeared { suspended: false });
        assert_eq!(t.observe("sporty:1", false), Transition::Unchanged);
        assert_eq!(t.observe("sporty:1", true), Transition::NowSuspended);
        assert_eq!(t.suspended_count(), 1);
        assert_eq!(t.observe("sporty:1", false), Transition::Resumed);
        assert_eq!(t.suspended_count(), 0);
    }

    #[test]
    fn tracker_forgets_finished_events() {
        let mut t = SuspensionTracker::new();
        t.observe("a", true);
        t.observe("b", false);
        let seen: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(t.retain_seen(&seen), vec!["a".to_string()]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.observe("a", true), Transition::Appeared { suspended: true });
    }
}
