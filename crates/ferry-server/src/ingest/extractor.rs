//! Streaming extractor
//!
//! Reads JSON array files record by record with a streaming serde visitor and
//! cuts the record sequence into chunks. Nothing is materialized beyond the
//! chunk being built: the reader runs on a blocking thread and only builds the
//! next chunk when the consumer of the [`ChunkStream`] asks for it.
//!
//! Chunk boundaries follow the run's [`ChunkingMode`]:
//!
//! - `Records(n)`: a chunk is closed when it holds `n` records and another
//!   record arrives.
//! - `Bytes(b)`: before appending a record, the canonical size the chunk would
//!   have (array framing included) is checked against `b`; if it would exceed
//!   the budget the chunk is closed first. A record that alone exceeds the
//!   budget travels in a chunk of its own.
//!
//! Chunks span file boundaries. Only the final chunk has `is_last` set.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ferry_common::protocol::{ChunkingMode, Record};
use ferry_common::{integrity, FerryError, Result};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use tokio::sync::mpsc;
use tracing::debug;

use super::source::ResolvedSource;

/// One segment of the record stream
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Zero-based emission order within the run
    pub number: i64,
    pub records: Vec<Record>,
    pub is_last: bool,
}

/// Pure chunk-boundary state machine
#[derive(Debug)]
pub struct Segmenter {
    mode: ChunkingMode,
    current: Vec<Record>,
    /// Canonical size of `current` serialized as an array
    current_bytes: usize,
    next_number: i64,
}

impl Segmenter {
    pub fn new(mode: ChunkingMode) -> Self {
        Self {
            mode,
            current: Vec::new(),
            current_bytes: 2,
            next_number: 0,
        }
    }

    /// Add a record; returns the chunk it closed, if any
    pub fn push(&mut self, record: Record) -> Option<Chunk> {
        let record_bytes = match self.mode {
            ChunkingMode::Bytes(_) => integrity::canonical_record_len(&record),
            ChunkingMode::Records(_) => 0,
        };

        let closed = if self.should_flush(record_bytes) {
            Some(self.take(false))
        } else {
            None
        };

        if !self.current.is_empty() {
            self.current_bytes += 1;
        }
        self.current_bytes += record_bytes;
        self.current.push(record);

        closed
    }

    /// Close the stream; returns the final chunk unless no records were seen
    /// since the last closed chunk.
    pub fn finish(mut self) -> Option<Chunk> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.take(true))
        }
    }

    fn should_flush(&self, record_bytes: usize) -> bool {
        if self.current.is_empty() {
            return false;
        }

        match self.mode {
            ChunkingMode::Records(limit) => self.current.len() >= limit as usize,
            ChunkingMode::Bytes(budget) => {
                let projected = self.current_bytes + 1 + record_bytes;
                projected as u64 > budget
            },
        }
    }

    fn take(&mut self, is_last: bool) -> Chunk {
        let chunk = Chunk {
            number: self.next_number,
            records: std::mem::take(&mut self.current),
            is_last,
        };
        self.next_number += 1;
        self.current_bytes = 2;
        chunk
    }
}

/// Pull-based handle over the background reader
pub struct ChunkStream {
    chunks: mpsc::Receiver<Result<Chunk>>,
    demand: mpsc::Sender<()>,
    _source: ResolvedSource,
}

impl ChunkStream {
    /// Start reading `source`. No I/O happens until the first `next()`.
    pub fn open(source: ResolvedSource, mode: ChunkingMode) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let (demand_tx, demand_rx) = mpsc::channel(1);
        let files = source.files.clone();

        tokio::task::spawn_blocking(move || {
            let mut producer = Producer {
                segmenter: Segmenter::new(mode),
                chunks: chunk_tx,
                demand: demand_rx,
                cancelled: false,
            };
            producer.run(&files);
        });

        Self {
            chunks: chunk_rx,
            demand: demand_tx,
            _source: source,
        }
    }

    /// Next chunk, or `None` once the source is exhausted or has failed
    pub async fn next(&mut self) -> Option<Result<Chunk>> {
        // A closed demand channel means the reader already finished; any
        // remaining chunk or error is still buffered.
        let _ = self.demand.send(()).await;
        self.chunks.recv().await
    }
}

struct Producer {
    segmenter: Segmenter,
    chunks: mpsc::Sender<Result<Chunk>>,
    demand: mpsc::Receiver<()>,
    cancelled: bool,
}

impl Producer {
    fn run(&mut self, files: &[PathBuf]) {
        if self.demand.blocking_recv().is_none() {
            return;
        }

        for file in files {
            if let Err(e) = self.read_file(file) {
                if !self.cancelled {
                    let _ = self.chunks.blocking_send(Err(e));
                }
                return;
            }
        }

        let segmenter = std::mem::replace(&mut self.segmenter, Segmenter::new(ChunkingMode::Records(1)));
        if let Some(last) = segmenter.finish() {
            let _ = self.chunks.blocking_send(Ok(last));
        }
    }

    fn read_file(&mut self, path: &Path) -> Result<()> {
        debug!(file = %path.display(), "Reading source file");

        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FerryError::SourceNotFound(path.display().to_string()),
            _ => FerryError::Io(e),
        })?;

        let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
        let parsed = de
            .deserialize_seq(RecordVisitor { producer: self })
            .and_then(|()| de.end());

        parsed.map_err(|e| {
            if e.is_io() {
                FerryError::Io(std::io::Error::other(e))
            } else {
                FerryError::Parse(format!("{}: {}", path.display(), e))
            }
        })
    }

    /// Hand a closed chunk over and wait until the next one is wanted
    fn emit(&mut self, chunk: Chunk) -> std::result::Result<(), Cancelled> {
        if self.chunks.blocking_send(Ok(chunk)).is_err() || self.demand.blocking_recv().is_none() {
            self.cancelled = true;
            return Err(Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("chunk stream dropped")
    }
}

struct RecordVisitor<'a> {
    producer: &'a mut Producer,
}

impl<'de> Visitor<'de> for RecordVisitor<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON array of objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(record) = seq.next_element::<Record>()? {
            if let Some(chunk) = self.producer.segmenter.push(record) {
                self.producer.emit(chunk).map_err(de::Error::custom)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn record(i: usize) -> Record {
        match json!({ "id": i, "name": format!("product-{}", i), "price": i as f64 + 0.5 }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn segment(mode: ChunkingMode, records: impl IntoIterator<Item = Record>) -> Vec<Chunk> {
        let mut segmenter = Segmenter::new(mode);
        let mut chunks: Vec<Chunk> = records.into_iter().filter_map(|r| segmenter.push(r)).collect();
        chunks.extend(segmenter.finish());
        chunks
    }

    async fn collect(mut stream: ChunkStream) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }

    fn write_records(path: &Path, range: std::ops::Range<usize>) {
        let values: Vec<_> = range.map(record).collect();
        fs::write(path, serde_json::to_vec(&values).unwrap()).unwrap();
    }

    #[test]
    fn test_record_mode_fills_every_chunk_but_last() {
        let chunks = segment(ChunkingMode::Records(25), (0..110).map(record));

        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.number, i as i64);
        }
        assert!(chunks[..4].iter().all(|c| c.records.len() == 25 && !c.is_last));
        assert_eq!(chunks[4].records.len(), 10);
        assert!(chunks[4].is_last);
    }

    #[test]
    fn test_record_mode_exact_multiple() {
        let chunks = segment(ChunkingMode::Records(2), (0..4).map(record));
        assert_eq!(chunks.len(), 2);
        assert!(!chunks[0].is_last);
        assert!(chunks[1].is_last);
    }

    #[test]
    fn test_byte_mode_never_exceeds_budget() {
        let budget = 300;
        let chunks = segment(ChunkingMode::Bytes(budget), (0..200).map(record));

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let size = integrity::canonicalize(&chunk.records).len() as u64;
            assert!(size <= budget, "chunk {} has {} bytes", chunk.number, size);
            assert!(!chunk.records.is_empty());
        }
        let total: usize = chunks.iter().map(|c| c.records.len()).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn test_byte_mode_packs_greedily() {
        let budget = 300;
        let chunks = segment(ChunkingMode::Bytes(budget), (0..50).map(record));

        // Every closed chunk must have been closed because the next record
        // would not fit.
        for pair in chunks.windows(2) {
            let mut grown = pair[0].records.clone();
            grown.push(pair[1].records[0].clone());
            assert!(integrity::canonicalize(&grown).len() as u64 > budget);
        }
    }

    #[test]
    fn test_oversized_record_travels_alone() {
        let big = match json!({ "blob": "x".repeat(500) }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let records = vec![record(0), big, record(1)];
        let chunks = segment(ChunkingMode::Bytes(100), records);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].records.len(), 1);
        assert!(chunks[1].records[0].contains_key("blob"));
    }

    #[test]
    fn test_no_records_no_chunks() {
        assert!(segment(ChunkingMode::Records(10), Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_stream_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("products.json");
        write_records(&file, 0..7);

        let stream = ChunkStream::open(ResolvedSource::local(vec![file]), ChunkingMode::Records(3));
        let chunks = collect(stream).await.unwrap();

        let sizes: Vec<_> = chunks.iter().map(|c| c.records.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(chunks[0].records[0]["id"], json!(0));
        assert!(chunks[2].is_last);
    }

    #[tokio::test]
    async fn test_chunks_span_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        write_records(&a, 0..3);
        write_records(&b, 3..5);

        let stream = ChunkStream::open(ResolvedSource::local(vec![a, b]), ChunkingMode::Records(2));
        let chunks = collect(stream).await.unwrap();

        let ids: Vec<Vec<i64>> = chunks
            .iter()
            .map(|c| c.records.iter().map(|r| r["id"].as_i64().unwrap()).collect())
            .collect();
        assert_eq!(ids, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        fs::write(&file, r#"[{"id": 1}, {"id": 2"#).unwrap();

        let stream = ChunkStream::open(ResolvedSource::local(vec![file]), ChunkingMode::Records(10));
        let err = collect(stream).await.unwrap_err();
        assert!(matches!(err, FerryError::Parse(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_non_object_record_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scalars.json");
        fs::write(&file, "[1, 2, 3]").unwrap();

        let stream = ChunkStream::open(ResolvedSource::local(vec![file]), ChunkingMode::Records(10));
        assert!(matches!(collect(stream).await, Err(FerryError::Parse(_))));
    }

    #[tokio::test]
    async fn test_records_before_error_are_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("partial.json");
        fs::write(&file, r#"[{"id": 0}, {"id": 1}, {"id": 2}, oops]"#).unwrap();

        let mut stream = ChunkStream::open(ResolvedSource::local(vec![file]), ChunkingMode::Records(2));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.records.len(), 2);
        assert!(matches!(stream.next().await, Some(Err(FerryError::Parse(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let stream = ChunkStream::open(
            ResolvedSource::local(vec![PathBuf::from("/no/such/source.json")]),
            ChunkingMode::Records(10),
        );
        assert!(matches!(collect(stream).await, Err(FerryError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_reader() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("many.json");
        write_records(&file, 0..1000);

        let mut stream = ChunkStream::open(ResolvedSource::local(vec![file]), ChunkingMode::Records(10));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.number, 0);
        drop(stream);
    }
}
