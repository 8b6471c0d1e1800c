//! Round ledger - per-round running aggregates
//!
//! The ledger is the only mutable state in the core. A round moves through
//! three states:
//!
//! ```text
//! absent --upsert--> active --upsert--> active
//!    ^                  |
//!    +---close_round----+   (close_round on an absent round is also valid)
//! ```
//!
//! `close_round` is the emission point: the accumulator is removed and handed
//! back in the same call, so the round is absent again afterwards and a later
//! event for the same id starts from zero.

use crate::event::RoundId;
use std::collections::HashMap;

/// Running totals for one open round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundAccumulator {
    pub total_bet: f64,
    pub total_win: f64,
    pub num_bets: u64,
    pub num_cashouts: u64,
    pub sum_multipliers: f64,
}

/// Increment applied to an accumulator in one step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundDelta {
    pub total_bet: f64,
    pub total_win: f64,
    pub num_bets: u64,
    pub num_cashouts: u64,
    pub sum_multipliers: f64,
}

impl RoundDelta {
    /// One registration or bet entrant
    pub fn bet(amount: f64) -> Self {
        Self {
            total_bet: amount,
            num_bets: 1,
            ..Self::default()
        }
    }

    /// One cashout entrant
    pub fn cashout(win: f64, multiplier: f64) -> Self {
        Self {
            total_win: win,
            num_cashouts: 1,
            sum_multipliers: multiplier,
            ..Self::default()
        }
    }
}

/// Closed-round record written to the summary stream
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub round_id: RoundId,
    pub crash_point: f64,
    pub total_bet: f64,
    pub total_win: f64,
    pub net_profit: f64,
    pub avg_multiplier: f64,
    pub num_bets: u64,
    pub num_cashouts: u64,
}

impl RoundAccumulator {
    fn apply(&mut self, delta: RoundDelta) {
        self.total_bet += delta.total_bet;
        self.total_win += delta.total_win;
        self.num_bets += delta.num_bets;
        self.num_cashouts += delta.num_cashouts;
        self.sum_multipliers += delta.sum_multipliers;
    }

    /// Mean cashout multiplier, zero when nobody cashed out
    pub fn avg_multiplier(&self) -> f64 {
        if self.num_cashouts > 0 {
            self.sum_multipliers / self.num_cashouts as f64
        } else {
            0.0
        }
    }

    pub fn summarize(&self, round_id: RoundId, crash_point: f64) -> SummaryRecord {
        SummaryRecord {
            round_id,
            crash_point,
            total_bet: self.total_bet,
            total_win: self.total_win,
            net_profit: self.total_win - self.total_bet,
            avg_multiplier: self.avg_multiplier(),
            num_bets: self.num_bets,
            num_cashouts: self.num_cashouts,
        }
    }
}

/// Open rounds keyed by round id
#[derive(Debug, Default)]
pub struct RoundLedger {
    rounds: HashMap<RoundId, RoundAccumulator>,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `delta` to the round, opening it with zeroed totals if absent
    pub fn upsert(&mut self, round_id: &RoundId, delta: RoundDelta) {
        self.rounds.entry(round_id.clone()).or_default().apply(delta);
    }

    /// Remove and return the round's totals (zeroed if it never opened)
    pub fn close_round(&mut self, round_id: &RoundId) -> RoundAccumulator {
        self.rounds.remove(round_id).unwrap_or_default()
    }

    pub fn get(&self, round_id: &RoundId) -> Option<&RoundAccumulator> {
        self.rounds.get(round_id)
    }

    pub fn contains(&self, round_id: &RoundId) -> bool {
        self.rounds.contains_key(round_id)
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Ids of rounds that have activity but no crash yet, sorted
    pub fn open_rounds(&self) -> Vec<RoundId> {
        let mut ids: Vec<RoundId> = self.rounds.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_and_accumulates() {
        let mut ledger = RoundLedger::new();
        let round = RoundId::from(1);

        assert!(!ledger.contains(&round));
        ledger.upsert(&round, RoundDelta::bet(10.0));
        ledger.upsert(&round, RoundDelta::bet(2.5));
        ledger.upsert(&round, RoundDelta::cashout(15.0, 1.5));

        let acc = ledger.get(&round).unwrap();
        assert_eq!(acc.total_bet, 12.5);
        assert_eq!(acc.num_bets, 2);
        assert_eq!(acc.total_win, 15.0);
        assert_eq!(acc.num_cashouts, 1);
        assert_eq!(acc.sum_multipliers, 1.5);
    }

    #[test]
    fn test_close_removes_round() {
        let mut ledger = RoundLedger::new();
        let round = RoundId::from(7);

        ledger.upsert(&round, RoundDelta::bet(5.0));
        let acc = ledger.close_round(&round);

        assert_eq!(acc.total_bet, 5.0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_upsert_after_close_starts_fresh() {
        let mut ledger = RoundLedger::new();
        let round = RoundId::from(7);

        ledger.upsert(&round, RoundDelta::bet(5.0));
        ledger.close_round(&round);
        ledger.upsert(&round, RoundDelta::bet(1.0));

        let acc = ledger.get(&round).unwrap();
        assert_eq!(acc.total_bet, 1.0);
        assert_eq!(acc.num_bets, 1);
    }

    #[test]
    fn test_close_unknown_round_is_zero() {
        let mut ledger = RoundLedger::new();
        let acc = ledger.close_round(&RoundId::from(42));

        assert_eq!(acc, RoundAccumulator::default());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rounds_are_independent() {
        let mut ledger = RoundLedger::new();
        let a = RoundId::from(1);
        let b = RoundId::from(2);

        ledger.upsert(&a, RoundDelta::bet(3.0));
        ledger.upsert(&b, RoundDelta::bet(4.0));
        ledger.upsert(&a, RoundDelta::cashout(6.0, 2.0));

        assert_eq!(ledger.open_rounds(), vec![a.clone(), b.clone()]);
        assert_eq!(ledger.close_round(&b).total_bet, 4.0);
        assert_eq!(ledger.get(&a).unwrap().total_win, 6.0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_summarize() {
        let acc = RoundAccumulator {
            total_bet: 10.0,
            total_win: 30.0,
            num_bets: 3,
            num_cashouts: 2,
            sum_multipliers: 5.0,
        };

        let summary = acc.summarize(RoundId::from(9), 3.2);
        assert_eq!(summary.net_profit, 20.0);
        assert_eq!(summary.avg_multiplier, 2.5);
        assert_eq!(summary.crash_point, 3.2);
        assert_eq!(summary.num_bets, 3);
    }

    #[test]
    fn test_avg_multiplier_without_cashouts() {
        let acc = RoundAccumulator {
            total_bet: 8.0,
            num_bets: 2,
            ..RoundAccumulator::default()
        };

        let summary = acc.summarize(RoundId::from(3), 1.0);
        assert_eq!(summary.avg_multiplier, 0.0);
        assert_eq!(summary.net_profit, -8.0);
    }
}
