//! Record sink - append-only row streams
//!
//! Five logical streams exist: four raw event logs and the derived round
//! summary. Each has a fixed column schema that is part of the on-disk
//! contract, so columns may only ever be appended, never reordered.

pub mod csv_writer;
pub mod sqlite_writer;

pub use csv_writer::CsvSink;
pub use sqlite_writer::SqliteSink;

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamName {
    Registration,
    Bets,
    Cashouts,
    Crash,
    Summary,
}

impl StreamName {
    pub fn all() -> [StreamName; 5] {
        [
            StreamName::Registration,
            StreamName::Bets,
            StreamName::Cashouts,
            StreamName::Crash,
            StreamName::Summary,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamName::Registration => "registration",
            StreamName::Bets => "bets",
            StreamName::Cashouts => "cashouts",
            StreamName::Crash => "crash",
            StreamName::Summary => "summary",
        }
    }

    /// Column names, in write order
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            StreamName::Registration | StreamName::Bets => {
                &["timestamp", "round_id", "id", "user", "bet"]
            }
            StreamName::Cashouts => &["timestamp", "round_id", "id", "win", "k"],
            StreamName::Crash => &["timestamp", "round_id", "crash_point"],
            StreamName::Summary => &[
                "round_id",
                "crash_point",
                "total_bet",
                "total_win",
                "net_profit",
                "avg_odds",
                "num_bets",
                "num_cashouts",
            ],
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of a row
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    Float(f64),
    Count(u64),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Text(s) => f.write_str(s),
            Field::Float(v) => write!(f, "{}", v),
            Field::Count(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Csv(csv::Error),
    Database(String),
    /// An earlier append to this stream failed; the stream takes no more rows
    Poisoned(StreamName),
    /// Row width does not match the stream's column count
    RowWidth {
        stream: StreamName,
        expected: usize,
        got: usize,
    },
    /// Existing file starts with a different header
    HeaderMismatch {
        stream: StreamName,
        found: Vec<String>,
    },
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<csv::Error> for SinkError {
    fn from(err: csv::Error) -> Self {
        SinkError::Csv(err)
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(err: rusqlite::Error) -> Self {
        SinkError::Database(err.to_string())
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Csv(e) => write!(f, "CSV error: {}", e),
            SinkError::Database(e) => write!(f, "Database error: {}", e),
            SinkError::Poisoned(stream) => {
                write!(f, "Stream '{}' is unusable after an earlier write failure", stream)
            }
            SinkError::RowWidth {
                stream,
                expected,
                got,
            } => write!(
                f,
                "Row for '{}' has {} columns, expected {}",
                stream, got, expected
            ),
            SinkError::HeaderMismatch { stream, found } => write!(
                f,
                "Stream '{}' has header {:?}, expected {:?}",
                stream,
                found,
                stream.header()
            ),
        }
    }
}

impl std::error::Error for SinkError {}

pub(crate) fn check_width(stream: StreamName, row: &[Field]) -> Result<(), SinkError> {
    let expected = stream.header().len();
    if row.len() != expected {
        return Err(SinkError::RowWidth {
            stream,
            expected,
            got: row.len(),
        });
    }
    Ok(())
}

/// Backend trait for appending rows to the named streams
#[async_trait]
pub trait RecordSink: Send {
    /// Append one row; durable once this returns `Ok`
    async fn append(&mut self, stream: StreamName, row: &[Field]) -> Result<(), SinkError>;

    /// Flush anything still buffered
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
