//! Crash-game feed recorder
//!
//! Streams hub events from a live crash game, logs every registration, bet,
//! cashout and crash as a raw row, and writes one summary row per round when
//! the round crashes.
//!
//! # Architecture
//!
//! ```text
//! feed::ws_client → ingestion (single consumer) → decoder → router
//!                                                            ├→ ledger (per-round totals)
//!                                                            └→ sink (CSV or SQLite streams)
//! ```

pub mod decoder;
pub mod event;
pub mod feed;
pub mod ingestion;
pub mod ledger;
pub mod router;
pub mod sink;

pub use decoder::{decode, split_records, Decoded, IgnoreReason};
pub use event::{Amount, BetEntry, CashoutEntry, Event, RoundId};
pub use ingestion::{ChannelHandler, FeedMessage, Ingestion, IngestionReport};
pub use ledger::{RoundAccumulator, RoundDelta, RoundLedger, SummaryRecord};
pub use router::{EventRouter, RouterStats};
pub use sink::{CsvSink, Field, RecordSink, SinkError, SqliteSink, StreamName};
