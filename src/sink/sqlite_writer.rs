use super::{check_width, Field, RecordSink, SinkError, StreamName};
use async_trait::async_trait;
use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::HashSet;
use std::path::Path;

impl ToSql for Field {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Field::Text(s) => ToSqlOutput::from(s.as_str()),
            Field::Float(v) => ToSqlOutput::from(*v),
            Field::Count(n) => ToSqlOutput::from(*n as i64),
        })
    }
}

fn column_type(stream: StreamName, column: &str) -> &'static str {
    match (stream, column) {
        (_, "round_id" | "id" | "user") => "TEXT",
        (StreamName::Summary, "num_bets" | "num_cashouts") => "INTEGER",
        _ => "REAL",
    }
}

fn create_table_sql(stream: StreamName) -> String {
    let columns: Vec<String> = stream
        .header()
        .iter()
        .map(|c| format!("\"{}\" {} NOT NULL", c, column_type(stream, c)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (seq INTEGER PRIMARY KEY AUTOINCREMENT, {})",
        stream.as_str(),
        columns.join(", ")
    )
}

fn insert_sql(stream: StreamName) -> String {
    let header = stream.header();
    let columns: Vec<String> = header.iter().map(|c| format!("\"{}\"", c)).collect();
    let placeholders: Vec<String> = (1..=header.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        stream.as_str(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// One table per stream in a single SQLite database
pub struct SqliteSink {
    conn: Connection,
    poisoned: HashSet<StreamName>,
}

impl SqliteSink {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path.as_ref())?;

        // Every append must survive a process crash once it returns
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        for stream in StreamName::all() {
            conn.execute(&create_table_sql(stream), [])?;
        }

        log::info!(
            "✅ SQLite streams ready in {} (WAL, synchronous=FULL)",
            db_path.as_ref().display()
        );

        Ok(Self {
            conn,
            poisoned: HashSet::new(),
        })
    }

    pub fn append_row(&mut self, stream: StreamName, row: &[Field]) -> Result<(), SinkError> {
        check_width(stream, row)?;
        if self.poisoned.contains(&stream) {
            return Err(SinkError::Poisoned(stream));
        }

        let result = self
            .conn
            .prepare_cached(&insert_sql(stream))
            .and_then(|mut stmt| stmt.execute(params_from_iter(row.iter())))
            .map(|_| ())
            .map_err(SinkError::from);

        if let Err(e) = &result {
            self.poisoned.insert(stream);
            log::error!("❌ Insert into {} failed, stream disabled: {}", stream, e);
        }

        result
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn append(&mut self, stream: StreamName, row: &[Field]) -> Result<(), SinkError> {
        self.append_row(stream, row)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        // autocommit: every insert is already its own transaction
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary_row(round: &str) -> Vec<Field> {
        vec![
            Field::Text(round.to_string()),
            Field::Float(1.5),
            Field::Float(10.0),
            Field::Float(15.0),
            Field::Float(5.0),
            Field::Float(1.5),
            Field::Count(1),
            Field::Count(1),
        ]
    }

    #[tokio::test]
    async fn test_sqlite_append_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("crash.db");

        {
            let mut sink = SqliteSink::open(&db_path).unwrap();
            sink.append(StreamName::Summary, &summary_row("1")).await.unwrap();
        }

        let mut sink = SqliteSink::open(&db_path).unwrap();
        sink.append(StreamName::Summary, &summary_row("2")).await.unwrap();

        let mut stmt = sink
            .connection()
            .prepare("SELECT round_id FROM summary ORDER BY seq")
            .unwrap();
        let rounds: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rounds, vec!["1".to_string(), "2".to_string()]);
        drop(stmt);

        let (net, bets): (f64, i64) = sink
            .connection()
            .query_row(
                "SELECT net_profit, num_bets FROM summary WHERE round_id = '2'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(net, 5.0);
        assert_eq!(bets, 1);
    }

    #[tokio::test]
    async fn test_sqlite_durability_pragmas() {
        let dir = tempdir().unwrap();
        let sink = SqliteSink::open(dir.path().join("crash.db")).unwrap();

        let journal_mode: String = sink
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        // FULL = 2
        let synchronous: i64 = sink
            .connection()
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .unwrap();
        assert_eq!(synchronous, 2);
    }

    #[tokio::test]
    async fn test_sqlite_row_width_checked() {
        let dir = tempdir().unwrap();
        let mut sink = SqliteSink::open(dir.path().join("crash.db")).unwrap();

        let result = sink.append(StreamName::Crash, &summary_row("1")).await;
        assert!(matches!(result, Err(SinkError::RowWidth { .. })));
    }

    #[tokio::test]
    async fn test_failed_insert_poisons_only_that_stream() {
        let dir = tempdir().unwrap();
        let mut sink = SqliteSink::open(dir.path().join("crash.db")).unwrap();
        let crash_row = [
            Field::Float(1.0),
            Field::Text("1".to_string()),
            Field::Text("1.5".to_string()),
        ];

        sink.connection().execute("DROP TABLE crash", []).unwrap();
        let first = sink.append(StreamName::Crash, &crash_row).await;
        assert!(matches!(first, Err(SinkError::Database(_))));

        // Stays disabled even once the table is back
        sink.connection()
            .execute(&create_table_sql(StreamName::Crash), [])
            .unwrap();
        let second = sink.append(StreamName::Crash, &crash_row).await;
        assert!(matches!(second, Err(SinkError::Poisoned(StreamName::Crash))));

        sink.append(StreamName::Summary, &summary_row("1")).await.unwrap();
        let count: i64 = sink
            .connection()
            .query_row("SELECT COUNT(*) FROM summary", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
