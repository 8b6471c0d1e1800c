//! Typed events decoded from the crash-game feed

use std::fmt;

/// Round identifier as sent by the feed (`l` key).
///
/// The hub sends integers today but the value is kept in its textual form
/// so it is written to the raw logs exactly as received. An event without
/// `l` carries the empty id: its raw rows are kept, the ledger never sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundId(String);

impl RoundId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RoundId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RoundId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Numeric feed value: `value` feeds the ledger, `raw` is the source text
/// written to the raw logs (`"2.50"` stays `2.50`, an absent field stays
/// empty).
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    pub value: f64,
    pub raw: String,
}

impl Amount {
    pub fn new(value: f64, raw: impl Into<String>) -> Self {
        Self {
            value,
            raw: raw.into(),
        }
    }

    /// Absent or null field: zero for the ledger, empty in the raw logs
    pub fn missing() -> Self {
        Self::new(0.0, "")
    }
}

/// One entrant of an `OnRegistration` / `OnBets` batch
#[derive(Debug, Clone, PartialEq)]
pub struct BetEntry {
    pub entrant_id: String,
    pub user: String,
    pub bet: Amount,
}

/// One entrant of an `OnCashouts` batch
#[derive(Debug, Clone, PartialEq)]
pub struct CashoutEntry {
    pub entrant_id: String,
    pub win: Amount,
    pub multiplier: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Registration {
        round_id: RoundId,
        entrants: Vec<BetEntry>,
    },
    Bets {
        round_id: RoundId,
        entrants: Vec<BetEntry>,
    },
    Cashouts {
        round_id: RoundId,
        entrants: Vec<CashoutEntry>,
    },
    Crash {
        round_id: RoundId,
        crash_point: Amount,
    },
}

impl Event {
    pub fn round_id(&self) -> &RoundId {
        match self {
            Event::Registration { round_id, .. }
            | Event::Bets { round_id, .. }
            | Event::Cashouts { round_id, .. }
            | Event::Crash { round_id, .. } => round_id,
        }
    }

    /// Hub target name this event was decoded from
    pub fn target(&self) -> &'static str {
        match self {
            Event::Registration { .. } => "OnRegistration",
            Event::Bets { .. } => "OnBets",
            Event::Cashouts { .. } => "OnCashouts",
            Event::Crash { .. } => "OnCrash",
        }
    }
}
