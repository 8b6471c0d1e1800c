//! Hub message decoding - raw transport frames to typed events
//!
//! The feed speaks the SignalR JSON hub protocol: every message is a JSON
//! object terminated by the `0x1E` record separator, and one WebSocket frame
//! may carry several of them. Only invocation messages whose `target` is one
//! of the four game events produce an [`Event`]; everything else (handshake
//! acks, pings, completions, unknown targets, garbage) is reported as
//! [`Decoded::Ignored`] and never surfaces as an error.

use crate::event::{Amount, BetEntry, CashoutEntry, Event, RoundId};
use serde_json::{Map, Value};

/// SignalR record separator
pub const RECORD_SEPARATOR: u8 = 0x1e;

/// Why a record produced no event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// Not JSON, not an object, or a recognized event with a bad shape
    Malformed,
    /// No `target` key (pings, handshake ack, completions)
    NoTarget,
    /// `arguments` missing or empty
    NoArguments,
    /// `target` is not one of the game events
    UnknownTarget,
    /// Recognized target without its `q` / `f` marker
    MissingMarker,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Event),
    Ignored(IgnoreReason),
}

impl Decoded {
    pub fn into_event(self) -> Option<Event> {
        match self {
            Decoded::Event(event) => Some(event),
            Decoded::Ignored(_) => None,
        }
    }
}

/// Split one transport frame into its separator-terminated records.
///
/// Blank records (a trailing separator, keepalive padding) are skipped.
pub fn split_records(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame
        .split(|b| *b == RECORD_SEPARATOR)
        .filter(|record| !record.iter().all(u8::is_ascii_whitespace))
}

/// Decode a single hub record
pub fn decode(record: &[u8]) -> Decoded {
    match try_decode(record) {
        Ok(event) => Decoded::Event(event),
        Err(reason) => Decoded::Ignored(reason),
    }
}

fn try_decode(record: &[u8]) -> Result<Event, IgnoreReason> {
    let value: Value =
        serde_json::from_slice(trim_record(record)).map_err(|_| IgnoreReason::Malformed)?;
    let message = value.as_object().ok_or(IgnoreReason::Malformed)?;

    let target = message.get("target").ok_or(IgnoreReason::NoTarget)?;
    let args = match message.get("arguments") {
        Some(Value::Array(arguments)) if !arguments.is_empty() => &arguments[0],
        _ => return Err(IgnoreReason::NoArguments),
    };
    let args = args.as_object().ok_or(IgnoreReason::Malformed)?;

    match target.as_str() {
        Some("OnRegistration") => {
            let batch = batch_marker(args)?;
            Ok(Event::Registration {
                round_id: round_id(args)?,
                entrants: batch.iter().map(bet_entry).collect::<Result<_, _>>()?,
            })
        }
        Some("OnBets") => {
            let batch = batch_marker(args)?;
            Ok(Event::Bets {
                round_id: round_id(args)?,
                entrants: batch.iter().map(bet_entry).collect::<Result<_, _>>()?,
            })
        }
        Some("OnCashouts") => {
            let batch = batch_marker(args)?;
            Ok(Event::Cashouts {
                round_id: round_id(args)?,
                entrants: batch.iter().map(cashout_entry).collect::<Result<_, _>>()?,
            })
        }
        Some("OnCrash") => {
            let crash_point = args.get("f").ok_or(IgnoreReason::MissingMarker)?;
            Ok(Event::Crash {
                round_id: round_id(args)?,
                crash_point: number(crash_point).ok_or(IgnoreReason::Malformed)?,
            })
        }
        _ => Err(IgnoreReason::UnknownTarget),
    }
}

fn trim_record(record: &[u8]) -> &[u8] {
    let is_padding = |b: &u8| *b == RECORD_SEPARATOR || b.is_ascii_whitespace();
    let start = record
        .iter()
        .position(|b| !is_padding(b))
        .unwrap_or(record.len());
    let end = record
        .iter()
        .rposition(|b| !is_padding(b))
        .map_or(start, |i| i + 1);
    &record[start..end]
}

fn batch_marker(args: &Map<String, Value>) -> Result<&Vec<Value>, IgnoreReason> {
    match args.get("q") {
        Some(Value::Array(batch)) => Ok(batch),
        Some(_) => Err(IgnoreReason::Malformed),
        None => Err(IgnoreReason::MissingMarker),
    }
}

/// Absent or null `l` yields the unknown id; a non-scalar id is malformed
fn round_id(args: &Map<String, Value>) -> Result<RoundId, IgnoreReason> {
    match args.get("l") {
        None | Some(Value::Null) => Ok(RoundId::unknown()),
        Some(Value::Number(n)) => Ok(RoundId::new(n.to_string())),
        Some(Value::String(s)) => Ok(RoundId::new(s.as_str())),
        Some(_) => Err(IgnoreReason::Malformed),
    }
}

fn bet_entry(entry: &Value) -> Result<BetEntry, IgnoreReason> {
    let entry = entry.as_object().ok_or(IgnoreReason::Malformed)?;
    Ok(BetEntry {
        entrant_id: text(entry.get("id")),
        user: text(entry.get("u")),
        bet: amount(entry.get("bet"))?,
    })
}

fn cashout_entry(entry: &Value) -> Result<CashoutEntry, IgnoreReason> {
    let entry = entry.as_object().ok_or(IgnoreReason::Malformed)?;
    Ok(CashoutEntry {
        entrant_id: text(entry.get("id")),
        win: amount(entry.get("win"))?,
        multiplier: amount(entry.get("k"))?,
    })
}

/// Optional numeric entrant field; absent or null counts as zero
fn amount(value: Option<&Value>) -> Result<Amount, IgnoreReason> {
    match value {
        None | Some(Value::Null) => Ok(Amount::missing()),
        Some(v) => number(v).ok_or(IgnoreReason::Malformed),
    }
}

/// JSON number or numeric string, keeping the text it was sent as
fn number(value: &Value) -> Option<Amount> {
    let (n, raw) = match value {
        Value::Number(n) => (n.as_f64()?, n.to_string()),
        Value::String(s) => (s.trim().parse::<f64>().ok()?, s.clone()),
        _ => return None,
    };
    n.is_finite().then(|| Amount::new(n, raw))
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_str(s: &str) -> Decoded {
        decode(s.as_bytes())
    }

    #[test]
    fn test_decode_registration() {
        let frame = "{\"type\":1,\"target\":\"OnRegistration\",\"arguments\":[{\"l\":1001,\"q\":[{\"id\":7,\"u\":\"alice\",\"bet\":10},{\"id\":8,\"u\":\"bob\",\"bet\":\"2.5\"}]}]}\u{1e}";

        let event = decode_str(frame).into_event().unwrap();
        match event {
            Event::Registration { round_id, entrants } => {
                assert_eq!(round_id, RoundId::from(1001));
                assert_eq!(entrants.len(), 2);
                assert_eq!(entrants[0].entrant_id, "7");
                assert_eq!(entrants[0].user, "alice");
                assert_eq!(entrants[0].bet, Amount::new(10.0, "10"));
                assert_eq!(entrants[1].bet, Amount::new(2.5, "2.5"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_cashouts_and_crash() {
        let cashouts = r#"{"target":"OnCashouts","arguments":[{"l":5,"q":[{"id":"x1","win":15.0,"k":1.5}]}]}"#;
        assert_eq!(
            decode_str(cashouts),
            Decoded::Event(Event::Cashouts {
                round_id: RoundId::from(5),
                entrants: vec![CashoutEntry {
                    entrant_id: "x1".to_string(),
                    win: Amount::new(15.0, "15.0"),
                    multiplier: Amount::new(1.5, "1.5"),
                }],
            })
        );

        let crash = r#"{"target":"OnCrash","arguments":[{"l":5,"f":1.53}]}"#;
        assert_eq!(
            decode_str(crash),
            Decoded::Event(Event::Crash {
                round_id: RoundId::from(5),
                crash_point: Amount::new(1.53, "1.53"),
            })
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let frame = r#"{"target":"OnBets","arguments":[{"l":9,"q":[{"id":1}]}]}"#;
        let event = decode_str(frame).into_event().unwrap();
        match event {
            Event::Bets { entrants, .. } => {
                assert_eq!(entrants[0].user, "");
                assert_eq!(entrants[0].bet, Amount::missing());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_amounts_keep_source_text() {
        let frame = r#"{"target":"OnBets","arguments":[{"l":4,"q":[{"id":1,"bet":"2.50"},{"id":2,"bet":null},{"id":3,"bet":7}]}]}"#;
        match decode_str(frame).into_event().unwrap() {
            Event::Bets { entrants, .. } => {
                assert_eq!(entrants[0].bet, Amount::new(2.5, "2.50"));
                assert_eq!(entrants[1].bet, Amount::new(0.0, ""));
                assert_eq!(entrants[2].bet, Amount::new(7.0, "7"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let crash = r#"{"target":"OnCrash","arguments":[{"l":4,"f":2.0}]}"#;
        assert_eq!(
            decode_str(crash),
            Decoded::Event(Event::Crash {
                round_id: RoundId::from(4),
                crash_point: Amount::new(2.0, "2.0"),
            })
        );
    }

    #[test]
    fn test_missing_round_id_decodes_as_unknown() {
        let crash = r#"{"target":"OnCrash","arguments":[{"f":2.0}]}"#;
        let event = decode_str(crash).into_event().unwrap();
        assert!(event.round_id().is_unknown());

        let bets = r#"{"target":"OnBets","arguments":[{"l":null,"q":[{"id":1,"bet":3}]}]}"#;
        let event = decode_str(bets).into_event().unwrap();
        assert!(event.round_id().is_unknown());
    }

    #[test]
    fn test_empty_batch_is_an_event() {
        let frame = r#"{"target":"OnBets","arguments":[{"l":9,"q":[]}]}"#;
        assert_eq!(
            decode_str(frame),
            Decoded::Event(Event::Bets {
                round_id: RoundId::from(9),
                entrants: vec![],
            })
        );
    }

    #[test]
    fn test_control_messages_ignored() {
        assert_eq!(decode_str("{}\u{1e}"), Decoded::Ignored(IgnoreReason::NoTarget));
        assert_eq!(decode_str(r#"{"type":6}"#), Decoded::Ignored(IgnoreReason::NoTarget));
        assert_eq!(
            decode_str(r#"{"type":3,"invocationId":"0","result":null}"#),
            Decoded::Ignored(IgnoreReason::NoTarget)
        );
    }

    #[test]
    fn test_missing_target_or_arguments() {
        assert_eq!(
            decode_str(r#"{"arguments":[{"l":1,"f":2.0}]}"#),
            Decoded::Ignored(IgnoreReason::NoTarget)
        );
        assert_eq!(
            decode_str(r#"{"target":"OnCrash"}"#),
            Decoded::Ignored(IgnoreReason::NoArguments)
        );
        assert_eq!(
            decode_str(r#"{"target":"OnCrash","arguments":[]}"#),
            Decoded::Ignored(IgnoreReason::NoArguments)
        );
    }

    #[test]
    fn test_unknown_target_and_missing_marker() {
        assert_eq!(
            decode_str(r#"{"target":"OnStage","arguments":[{"l":1}]}"#),
            Decoded::Ignored(IgnoreReason::UnknownTarget)
        );
        assert_eq!(
            decode_str(r#"{"target":"OnCrash","arguments":[{"l":1}]}"#),
            Decoded::Ignored(IgnoreReason::MissingMarker)
        );
        assert_eq!(
            decode_str(r#"{"target":"OnCashouts","arguments":[{"l":1}]}"#),
            Decoded::Ignored(IgnoreReason::MissingMarker)
        );
    }

    #[test]
    fn test_malformed_records() {
        assert_eq!(decode_str(r#"{"target": "#), Decoded::Ignored(IgnoreReason::Malformed));
        assert_eq!(decode_str("[1,2,3]"), Decoded::Ignored(IgnoreReason::Malformed));
        assert_eq!(
            decode_str(r#"{"target":"OnBets","arguments":[{"l":1,"q":[{"bet":"lots"}]}]}"#),
            Decoded::Ignored(IgnoreReason::Malformed)
        );
        assert_eq!(
            decode_str(r#"{"target":"OnCrash","arguments":[{"l":{"id":1},"f":2.0}]}"#),
            Decoded::Ignored(IgnoreReason::Malformed)
        );
        assert_eq!(
            decode_str(r#"{"target":"OnCrash","arguments":[{"l":1,"f":"NaN"}]}"#),
            Decoded::Ignored(IgnoreReason::Malformed)
        );
    }

    #[test]
    fn test_split_records() {
        let frame = b"{\"type\":6}\x1e{\"target\":\"OnCrash\",\"arguments\":[{\"l\":3,\"f\":1.1}]}\x1e";
        let decoded: Vec<Decoded> = split_records(frame).map(decode).collect();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], Decoded::Ignored(IgnoreReason::NoTarget));
        assert!(matches!(decoded[1], Decoded::Event(Event::Crash { .. })));
    }

    #[test]
    fn test_split_skips_blank_records() {
        let frame = b"\x1e  \x1e\n";
        assert_eq!(split_records(frame).count(), 0);
    }
}
