use super::{check_width, Field, RecordSink, SinkError, StreamName};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

struct CsvStream {
    writer: csv::Writer<File>,
    path: PathBuf,
    poisoned: bool,
}

/// One `<stream>.csv` file per stream inside an output directory
pub struct CsvSink {
    dir: PathBuf,
    streams: HashMap<StreamName, CsvStream>,
}

impl CsvSink {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut streams = HashMap::new();
        for stream in StreamName::all() {
            let path = dir.join(format!("{}.csv", stream.as_str()));
            streams.insert(stream, Self::open_stream(stream, path)?);
        }

        log::info!("📝 CSV streams ready in {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            streams,
        })
    }

    fn open_stream(stream: StreamName, path: PathBuf) -> Result<CsvStream, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        if !is_new {
            Self::verify_header(stream, &path)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_new {
            writer.write_record(stream.header())?;
            writer.flush()?;
            log::debug!("Initialized {} with header", path.display());
        }

        Ok(CsvStream {
            writer,
            path,
            poisoned: false,
        })
    }

    fn verify_header(stream: StreamName, path: &Path) -> Result<(), SinkError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let found = match reader.records().next() {
            Some(record) => record?,
            None => return Ok(()),
        };

        if !found.iter().eq(stream.header().iter().copied()) {
            return Err(SinkError::HeaderMismatch {
                stream,
                found: found.iter().map(str::to_string).collect(),
            });
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, stream: StreamName) -> Option<&Path> {
        self.streams.get(&stream).map(|s| s.path.as_path())
    }

    pub fn append_row(&mut self, stream: StreamName, row: &[Field]) -> Result<(), SinkError> {
        check_width(stream, row)?;

        let entry = self
            .streams
            .get_mut(&stream)
            .ok_or(SinkError::Poisoned(stream))?;
        if entry.poisoned {
            return Err(SinkError::Poisoned(stream));
        }

        let result = entry
            .writer
            .write_record(row.iter().map(Field::to_string))
            .map_err(SinkError::from)
            .and_then(|_| entry.writer.flush().map_err(SinkError::from));

        if let Err(e) = &result {
            entry.poisoned = true;
            log::error!("❌ Write to {} failed, stream disabled: {}", entry.path.display(), e);
        }

        result
    }

    pub fn flush_all(&mut self) -> Result<(), SinkError> {
        for entry in self.streams.values_mut().filter(|s| !s.poisoned) {
            entry.writer.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn append(&mut self, stream: StreamName, row: &[Field]) -> Result<(), SinkError> {
        self.append_row(stream, row)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flush_all()
    }

    fn backend_type(&self) -> &'static str {
        "CSV"
    }
}
