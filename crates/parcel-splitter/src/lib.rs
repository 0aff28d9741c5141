//! Lazy, index-ordered chunk splitting.
//!
//! Splits a source file into fixed-size chunks, computes each chunk's
//! digest, and emits the digested chunks in batches as soon as a batch
//! finishes — so uploading can start before every chunk is fingerprinted.
//! Digesting runs on a bounded pool of worker threads when more than one
//! is available, falling back to an inline, cooperatively-yielding loop
//! otherwise. Both strategies share the same event contract so a caller
//! never needs to know which one ran.

use crossbeam_channel::{Receiver, Sender};
use parcel_fingerprint::FingerprintError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Default chunk size (5 MiB), matching the server's default unless it
/// overrides it in the `initiate` response.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Number of chunk descriptors handed to a single batch in the inline
/// (single-threaded) fallback, small enough to keep the calling thread
/// responsive between batches.
const INLINE_BATCH_SIZE: usize = 4;

#[derive(Error, Debug)]
pub enum SplitterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A single digested chunk, ready to be scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestedChunk {
    pub index: u32,
    pub start: u64,
    pub end: u64,
    pub digest: String,
}

impl DigestedChunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Events emitted by a running split, in the order described in the
/// module docs: zero or more `Chunks` batches (possibly out of order
/// across batches, but index-ordered within a batch), then exactly one
/// `WholeHash`, then exactly one `Drain`.
#[derive(Debug, Clone)]
pub enum SplitEvent {
    Chunks(Vec<DigestedChunk>),
    WholeHash(String),
    Drain,
}

#[derive(Debug, Clone, Copy)]
struct ChunkBounds {
    index: u32,
    start: u64,
    end: u64,
}

fn descriptor_count(file_len: u64, chunk_size: u64) -> u32 {
    if file_len == 0 {
        0
    } else {
        ((file_len + chunk_size - 1) / chunk_size) as u32
    }
}

fn bounds_for(file_len: u64, chunk_size: u64, n: u32) -> Vec<ChunkBounds> {
    (0..n)
        .map(|index| {
            let start = index as u64 * chunk_size;
            let end = (start + chunk_size).min(file_len);
            ChunkBounds { index, start, end }
        })
        .collect()
}

fn digest_batch(path: &Path, batch: &[ChunkBounds]) -> Result<Vec<DigestedChunk>, SplitterError> {
    let mut file = File::open(path)?;
    let mut out = Vec::with_capacity(batch.len());

    for bounds in batch {
        file.seek(SeekFrom::Start(bounds.start))?;
        let len = bounds.end - bounds.start;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        out.push(DigestedChunk {
            index: bounds.index,
            start: bounds.start,
            end: bounds.end,
            digest: parcel_fingerprint::digest(&buf),
        });
    }

    Ok(out)
}

/// Partition `n` indices into at most `workers` roughly-equal contiguous
/// batches, preserving ascending index order within each batch.
fn partition(bounds: &[ChunkBounds], workers: usize) -> Vec<Vec<ChunkBounds>> {
    if bounds.is_empty() || workers <= 1 {
        return vec![bounds.to_vec()];
    }

    let workers = workers.min(bounds.len());
    let base = bounds.len() / workers;
    let extra = bounds.len() % workers;

    let mut batches = Vec::with_capacity(workers);
    let mut cursor = 0;
    for w in 0..workers {
        let size = base + if w < extra { 1 } else { 0 };
        batches.push(bounds[cursor..cursor + size].to_vec());
        cursor += size;
    }
    batches
}

/// One-shot chunk splitter. `split()` consumes the instance: a second
/// invocation is not possible because the type no longer exists.
pub struct ChunkSplitter {
    path: PathBuf,
    chunk_size: u64,
    max_workers: usize,
}

impl ChunkSplitter {
    pub fn new(path: impl Into<PathBuf>, chunk_size: u64) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            path: path.into(),
            chunk_size,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        })
    }

    /// Cap the worker pool size (e.g. when `enableMultiThread` is off,
    /// callers should pass `1` to force the inline fallback).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Begin splitting. Returns immediately; chunk digesting and whole-hash
    /// folding happen on a background thread (and, when more than one
    /// worker is available, a bounded rayon thread pool underneath it),
    /// with results delivered through the returned channel.
    pub fn split(self) -> Result<Receiver<SplitEvent>, SplitterError> {
        let file_len = std::fs::metadata(&self.path)?.len();
        let n = descriptor_count(file_len, self.chunk_size);
        let workers = self.max_workers.min(n.max(1) as usize);

        let (tx, rx) = crossbeam_channel::unbounded();
        let path = self.path;
        let chunk_size = self.chunk_size;

        std::thread::Builder::new()
            .name("parcel-splitter".into())
            .spawn(move || run(path, chunk_size, file_len, n, workers, tx))
            .map_err(SplitterError::Io)?;

        Ok(rx)
    }
}

fn run(path: PathBuf, chunk_size: u64, file_len: u64, n: u32, workers: usize, tx: Sender<SplitEvent>) {
    if n == 0 {
        let whole = parcel_fingerprint::fold(std::iter::empty::<String>()).unwrap_or_default();
        let _ = tx.send(SplitEvent::WholeHash(whole));
        let _ = tx.send(SplitEvent::Drain);
        return;
    }

    let bounds = bounds_for(file_len, chunk_size, n);
    let digests: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(vec![None; n as usize]));

    let record = |batch: &[DigestedChunk], digests: &Arc<Mutex<Vec<Option<String>>>>| {
        let mut guard = digests.lock().unwrap();
        for chunk in batch {
            guard[chunk.index as usize] = Some(chunk.digest.clone());
        }
    };

    if workers <= 1 {
        // Inline fallback: digest small batches with cooperative yielding
        // between them so the calling process stays responsive.
        for batch_bounds in bounds.chunks(INLINE_BATCH_SIZE) {
            match digest_batch(&path, batch_bounds) {
                Ok(batch) => {
                    record(&batch, &digests);
                    if tx.send(SplitEvent::Chunks(batch)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("chunk digesting failed: {e}");
                    return;
                }
            }
            std::thread::yield_now();
        }
    } else {
        let batches = partition(&bounds, workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build();

        let dispatch = |pool: &rayon::ThreadPool| {
            pool.scope(|scope| {
                for batch_bounds in batches {
                    let path = path.clone();
                    let tx = tx.clone();
                    let digests = digests.clone();
                    scope.spawn(move |_| match digest_batch(&path, &batch_bounds) {
                        Ok(batch) => {
                            record(&batch, &digests);
                            let _ = tx.send(SplitEvent::Chunks(batch));
                        }
                        Err(e) => tracing::error!("chunk digesting failed: {e}"),
                    });
                }
            });
        };

        match pool {
            Ok(pool) => dispatch(&pool),
            Err(e) => {
                // Worker-pool construction failed (e.g. restricted
                // environment): fall back to running every batch inline
                // on this thread rather than losing the upload entirely.
                tracing::warn!("failed to build digest worker pool ({e}), falling back to inline digesting");
                for batch_bounds in bounds.chunks(INLINE_BATCH_SIZE) {
                    if let Ok(batch) = digest_batch(&path, &batch_bounds) {
                        record(&batch, &digests);
                        let _ = tx.send(SplitEvent::Chunks(batch));
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    let ordered = digests.lock().unwrap();
    if ordered.iter().any(|d| d.is_none()) {
        // A worker failed to digest its batch; no whole-hash can be
        // computed. The receiver simply never sees a WholeHash/Drain pair,
        // which the controller's caller-side timeout handles.
        return;
    }
    let ordered: Vec<String> = ordered.iter().cloned().map(Option::unwrap).collect();

    match parcel_fingerprint::fold(ordered) {
        Ok(whole) => {
            let _ = tx.send(SplitEvent::WholeHash(whole));
        }
        Err(e) => tracing::error!("whole-file fold failed: {e}"),
    }
    let _ = tx.send(SplitEvent::Drain);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn collect_all(rx: Receiver<SplitEvent>) -> (Vec<DigestedChunk>, Option<String>) {
        let mut chunks = Vec::new();
        let mut whole = None;
        for event in rx.iter() {
            match event {
                SplitEvent::Chunks(mut batch) => chunks.append(&mut batch),
                SplitEvent::WholeHash(h) => whole = Some(h),
                SplitEvent::Drain => break,
            }
        }
        chunks.sort_by_key(|c| c.index);
        (chunks, whole)
    }

    #[test]
    fn single_chunk_small_file() {
        let data = vec![0xAAu8; 1024];
        let file = write_temp_file(&data);
        let splitter = ChunkSplitter::new(file.path(), 5 * 1024 * 1024).unwrap();
        let rx = splitter.split().unwrap();
        let (chunks, whole) = collect_all(rx);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 1024);
        assert!(whole.is_some());
    }

    #[test]
    fn exact_multiple_splits_evenly() {
        let data: Vec<u8> = (0..10 * 1024 * 1024u32).map(|i| (i % 256) as u8).collect();
        let file = write_temp_file(&data);
        let splitter = ChunkSplitter::new(file.path(), 5 * 1024 * 1024).unwrap();
        let rx = splitter.split().unwrap();
        let (chunks, _) = collect_all(rx);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].end - chunks[0].start, 5 * 1024 * 1024);
        assert_eq!(chunks[1].end - chunks[1].start, 5 * 1024 * 1024);
    }

    #[test]
    fn uneven_last_chunk() {
        let data = vec![0u8; 12 * 1024 * 1024];
        let file = write_temp_file(&data);
        let splitter = ChunkSplitter::new(file.path(), 5 * 1024 * 1024).unwrap();
        let rx = splitter.split().unwrap();
        let (chunks, _) = collect_all(rx);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].end - chunks[2].start, 2 * 1024 * 1024);
    }

    #[test]
    fn whole_hash_is_order_independent_of_batch_arrival() {
        let data: Vec<u8> = (0..1_500_000u32).map(|i| (i % 256) as u8).collect();
        let file = write_temp_file(&data);

        let inline = ChunkSplitter::new(file.path(), 200_000)
            .unwrap()
            .with_max_workers(1);
        let (_, whole_inline) = collect_all(inline.split().unwrap());

        let parallel = ChunkSplitter::new(file.path(), 200_000)
            .unwrap()
            .with_max_workers(4);
        let (_, whole_parallel) = collect_all(parallel.split().unwrap());

        assert_eq!(whole_inline, whole_parallel);
    }

    #[test]
    fn empty_file_yields_zero_chunks_and_a_whole_hash() {
        let file = write_temp_file(&[]);
        let splitter = ChunkSplitter::new(file.path(), 5 * 1024 * 1024).unwrap();
        let (chunks, whole) = collect_all(splitter.split().unwrap());

        assert!(chunks.is_empty());
        assert!(whole.is_some());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let file = write_temp_file(b"data");
        assert!(ChunkSplitter::new(file.path(), 0).is_err());
    }
}
