//! Event routing - raw rows out, ledger updates in, summaries on crash

use crate::event::{BetEntry, CashoutEntry, Event, RoundId};
use crate::ledger::{RoundDelta, RoundLedger, SummaryRecord};
use crate::sink::{Field, RecordSink, SinkError, StreamName};
use chrono::{DateTime, Utc};

/// Counters for the periodic throughput log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub events_routed: u64,
    pub rows_written: u64,
    pub rounds_closed: u64,
}

/// Owns the round ledger and the sink; every mutation of either goes
/// through `route`, one event at a time.
pub struct EventRouter {
    ledger: RoundLedger,
    sink: Box<dyn RecordSink>,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(sink: Box<dyn RecordSink>) -> Self {
        Self {
            ledger: RoundLedger::new(),
            sink,
            stats: RouterStats::default(),
        }
    }

    /// Apply one event. Returns the summary when the event closed a round.
    ///
    /// A sink failure is returned as soon as it happens; the remaining
    /// entrants of that batch are not applied. Events without a round id
    /// only reach the raw logs.
    pub async fn route(
        &mut self,
        event: Event,
        received_at: DateTime<Utc>,
    ) -> Result<Option<SummaryRecord>, SinkError> {
        self.stats.events_routed += 1;
        let ts = receipt_timestamp(received_at);

        match event {
            Event::Registration { round_id, entrants } => {
                self.record_bets(StreamName::Registration, ts, &round_id, &entrants)
                    .await?;
                Ok(None)
            }
            Event::Bets { round_id, entrants } => {
                self.record_bets(StreamName::Bets, ts, &round_id, &entrants)
                    .await?;
                Ok(None)
            }
            Event::Cashouts { round_id, entrants } => {
                self.record_cashouts(ts, &round_id, &entrants).await?;
                Ok(None)
            }
            Event::Crash {
                round_id,
                crash_point,
            } => {
                let row = [
                    Field::Float(ts),
                    Field::Text(round_id.to_string()),
                    Field::Text(crash_point.raw),
                ];
                self.sink.append(StreamName::Crash, &row).await?;
                self.stats.rows_written += 1;

                if round_id.is_unknown() {
                    log::debug!("Crash without round id, no summary emitted");
                    return Ok(None);
                }
                let summary = self.close_round(round_id, crash_point.value).await?;
                Ok(Some(summary))
            }
        }
    }

    async fn record_bets(
        &mut self,
        stream: StreamName,
        ts: f64,
        round_id: &RoundId,
        entrants: &[BetEntry],
    ) -> Result<(), SinkError> {
        for entry in entrants {
            let row = [
                Field::Float(ts),
                Field::Text(round_id.to_string()),
                Field::Text(entry.entrant_id.clone()),
                Field::Text(entry.user.clone()),
                Field::Text(entry.bet.raw.clone()),
            ];
            self.sink.append(stream, &row).await?;
            self.stats.rows_written += 1;
            if !round_id.is_unknown() {
                self.ledger.upsert(round_id, RoundDelta::bet(entry.bet.value));
            }
        }
        Ok(())
    }

    async fn record_cashouts(
        &mut self,
        ts: f64,
        round_id: &RoundId,
        entrants: &[CashoutEntry],
    ) -> Result<(), SinkError> {
        for entry in entrants {
            let row = [
                Field::Float(ts),
                Field::Text(round_id.to_string()),
                Field::Text(entry.entrant_id.clone()),
                Field::Text(entry.win.raw.clone()),
                Field::Text(entry.multiplier.raw.clone()),
            ];
            self.sink.append(StreamName::Cashouts, &row).await?;
            self.stats.rows_written += 1;
            if !round_id.is_unknown() {
                self.ledger.upsert(
                    round_id,
                    RoundDelta::cashout(entry.win.value, entry.multiplier.value),
                );
            }
        }
        Ok(())
    }

    async fn close_round(
        &mut self,
        round_id: RoundId,
        crash_point: f64,
    ) -> Result<SummaryRecord, SinkError> {
        let summary = self
            .ledger
            .close_round(&round_id)
            .summarize(round_id, crash_point);
        self.sink
            .append(StreamName::Summary, &summary_row(&summary))
            .await?;
        self.stats.rounds_closed += 1;

        log::info!(
            "Round {} → crash {}, bets={}, cashouts={}, total_bet={:.2}, total_win={:.2}, net={:.2}, avg_k={:.2}",
            summary.round_id,
            summary.crash_point,
            summary.num_bets,
            summary.num_cashouts,
            summary.total_bet,
            summary.total_win,
            summary.net_profit,
            summary.avg_multiplier
        );

        Ok(summary)
    }

    pub fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn backend_type(&self) -> &'static str {
        self.sink.backend_type()
    }

    pub async fn flush(&mut self) -> Result<(), SinkError> {
        self.sink.flush().await
    }
}

fn summary_row(summary: &SummaryRecord) -> [Field; 8] {
    [
        Field::Text(summary.round_id.to_string()),
        Field::Float(summary.crash_point),
        Field::Float(summary.total_bet),
        Field::Float(summary.total_win),
        Field::Float(summary.net_profit),
        Field::Float(summary.avg_multiplier),
        Field::Count(summary.num_bets),
        Field::Count(summary.num_cashouts),
    ]
}

/// Unix seconds with microsecond fraction
fn receipt_timestamp(received_at: DateTime<Utc>) -> f64 {
    received_at.timestamp_micros() as f64 / 1_000_000.0
}
