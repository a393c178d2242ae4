use crate::error::{Result, SourceError};
use crate::record::RequestRecord;
use serde::de::{self, SeqAccess, Visitor};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// File-name suffix that marks a file as a batch of request records.
pub const BATCH_EXTENSION: &str = ".json";

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub records: usize,
    pub malformed: usize,
    stopped: bool,
}

impl BatchSummary {
    /// True when the consumer asked to stop before the array was exhausted.
    pub fn stopped(&self) -> bool {
        self.stopped
    }
}

#[derive(Debug)]
pub enum BatchEvent {
    Started {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    Record(Box<RequestRecord>),
    Finished {
        index: usize,
        summary: BatchSummary,
    },
}

/// An ordered set of batch files, read one after the other.
#[derive(Debug, Clone)]
pub struct BatchReader {
    batches: Vec<PathBuf>,
    capacity: usize,
}

impl BatchReader {
    /// Collect every eligible batch file in `dir`, sorted by file name.
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            return Err(SourceError::NotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(SourceError::NotADirectory(dir.to_path_buf()));
        }

        let io_err = |source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut batches = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_batch_file(&path) {
                batches.push(path);
            }
        }

        if batches.is_empty() {
            return Err(SourceError::NoBatches {
                dir: dir.to_path_buf(),
                extension: BATCH_EXTENSION,
            });
        }

        batches.sort();
        debug!("Discovered {} batch file(s) in {}", batches.len(), dir.display());
        Ok(Self::from_paths(batches))
    }

    pub fn from_paths(batches: Vec<PathBuf>) -> Self {
        Self {
            batches,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn batches(&self) -> &[PathBuf] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Start a single blocking producer that reads the batches in order and
    /// hands records to the returned stream.
    pub fn stream(self) -> BatchStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        let batches = self.batches;
        let producer = tokio::task::spawn_blocking(move || produce(batches, tx));

        BatchStream {
            rx,
            producer: Some(producer),
        }
    }
}

pub fn is_batch_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(BATCH_EXTENSION))
}

/// Receiving half of a running [`BatchReader`].
pub struct BatchStream {
    rx: mpsc::Receiver<BatchEvent>,
    producer: Option<JoinHandle<Result<()>>>,
}

impl BatchStream {
    /// Next event in batch order. After the last event, surfaces the
    /// producer's failure (if any) once and then returns `None`.
    pub async fn next(&mut self) -> Option<Result<BatchEvent>> {
        if let Some(event) = self.rx.recv().await {
            return Some(Ok(event));
        }

        let producer = self.producer.take()?;
        match producer.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(Err(e)),
            Err(e) => Some(Err(SourceError::Producer(e))),
        }
    }
}

fn produce(batches: Vec<PathBuf>, tx: mpsc::Sender<BatchEvent>) -> Result<()> {
    let total = batches.len();

    for (index, path) in batches.into_iter().enumerate() {
        info!("Reading batch {}/{}: {}", index + 1, total, path.display());

        let started = BatchEvent::Started {
            index,
            total,
            path: path.clone(),
        };
        if tx.blocking_send(started).is_err() {
            // Consumer went away; nothing left to deliver to.
            return Ok(());
        }

        let summary = read_batch(&path, |record| {
            match tx.blocking_send(BatchEvent::Record(Box::new(record))) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            }
        })?;

        if summary.stopped() {
            return Ok(());
        }

        debug!(
            "Batch {} done: {} record(s), {} malformed",
            path.display(),
            summary.records,
            summary.malformed
        );

        if tx.blocking_send(BatchEvent::Finished { index, summary }).is_err() {
            return Ok(());
        }
    }

    Ok(())
}

/// Walk the top-level JSON array of `path` lazily, handing each well-formed
/// record to `on_record` in file order.
///
/// Elements that are not request records are counted as malformed and
/// skipped. A file that is not a JSON array at all is an error.
pub fn read_batch<F>(path: &Path, on_record: F) -> Result<BatchSummary>
where
    F: FnMut(RequestRecord) -> ControlFlow<()>,
{
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
    let mut summary = BatchSummary::default();

    let visitor = BatchVisitor {
        on_record,
        summary: &mut summary,
        path,
    };
    let walked = serde::Deserializer::deserialize_seq(&mut de, visitor).and_then(|()| de.end());

    match walked {
        Ok(()) => Ok(summary),
        Err(_) if summary.stopped => Ok(summary),
        Err(source) => Err(SourceError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

struct BatchVisitor<'a, F> {
    on_record: F,
    summary: &'a mut BatchSummary,
    path: &'a Path,
}

impl<'de, F> Visitor<'de> for BatchVisitor<'_, F>
where
    F: FnMut(RequestRecord) -> ControlFlow<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON array of request records")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(value) = seq.next_element::<serde_json::Value>()? {
            match serde_json::from_value::<RequestRecord>(value) {
                Ok(record) => {
                    self.summary.records += 1;
                    if (self.on_record)(record).is_break() {
                        self.summary.stopped = true;
                        return Err(de::Error::custom("batch consumer stopped"));
                    }
                }
                Err(e) => {
                    self.summary.malformed += 1;
                    debug!("Skipping malformed record in {}: {}", self.path.display(), e);
                }
            }
        }

        Ok(())
    }
}
