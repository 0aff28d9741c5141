//! Upload Controller (C4): orchestrates a session from `initiate` through
//! `merge`, owning the state machine, progress accounting, and retry policy
//! (spec.md §4.4).
//!
//! Following spec.md §9's design note on cyclic ownership, per-chunk upload
//! tasks never close over the controller. Instead each task is a self
//! contained async closure that reports its outcome back over a channel,
//! which the orchestration loop (running on a single task) consumes
//! serially and uses to mutate session state.

use crate::error::{ClientError, Result};
use crate::progress::{Progress, UploadEvent};
use crate::session::{ChunkDescriptor, SessionStatus, UploadSession};
use crate::transport::{HashKind, InitiateRequest, TransportAdapter};
use parcel_resilience::backoff::BackoffPolicy;
use parcel_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
use parcel_scheduler::Scheduler;
use parcel_splitter::{ChunkSplitter, SplitEvent};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

/// Outcome of a single chunk's upload task, posted back to the orchestration
/// loop. The task never mutates session state directly.
enum ChunkOutcome {
    Uploaded { index: u32, bytes: u64 },
    Failed { index: u32, error: ClientError },
}

pub struct UploadController {
    config: crate::config::UploadConfig,
    transport: Arc<dyn TransportAdapter>,
    backoff: BackoffPolicy,
    circuit_breaker: CircuitBreaker,
    active_scheduler: Arc<StdMutex<Option<Arc<Scheduler>>>>,
}

impl UploadController {
    pub fn new(config: crate::config::UploadConfig, transport: Arc<dyn TransportAdapter>) -> Self {
        let backoff = BackoffPolicy::new(Duration::from_millis(config.retry_delay_ms), config.retry_count + 1);
        // Additive reliability layer on top of the per-chunk retry cap below:
        // once a burst of transfers fail in a row, fail fast instead of
        // letting every in-flight chunk run its own retry loop against a
        // server that is already down.
        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: (config.concurrency * 2).max(4),
            ..Default::default()
        });
        Self { config, transport, backoff, circuit_breaker, active_scheduler: Arc::new(StdMutex::new(None)) }
    }

    /// Hold back dispatch of not-yet-started chunks. Chunks already in
    /// flight run to completion; queued chunks stay queued until [`resume`](Self::resume).
    /// A no-op if no session is currently running.
    pub fn pause(&self) {
        if let Some(scheduler) = self.active_scheduler.lock().unwrap().as_ref() {
            scheduler.pause();
        }
    }

    /// Resume dispatch after [`pause`](Self::pause).
    pub fn resume(&self) {
        if let Some(scheduler) = self.active_scheduler.lock().unwrap().as_ref() {
            scheduler.resume();
        }
    }

    /// Abandon the running session. In-flight chunk uploads finish, queued
    /// ones are dropped, and [`run`](Self::run) returns [`ClientError::Cancelled`].
    pub fn cancel(&self) {
        if let Some(scheduler) = self.active_scheduler.lock().unwrap().as_ref() {
            scheduler.cancel();
        }
    }

    /// Run a full upload session to completion, emitting events as it goes.
    /// Returns the final artifact URL on success.
    pub async fn run(&self, file_path: PathBuf, events: mpsc::UnboundedSender<UploadEvent>) -> Result<String> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| ClientError::Validation("upload path has no file name".to_string()))?
            .to_string_lossy()
            .to_string();
        let metadata = tokio::fs::metadata(&file_path).await?;
        let file_size = metadata.len();

        let mut session = UploadSession::new(file_path.clone(), file_name.clone(), file_size, "application/octet-stream".to_string(), self.config.chunk_size);

        self.transition(&mut session, SessionStatus::Splitting, &events);

        let initiate = self
            .transport
            .initiate(InitiateRequest { file_name: file_name.clone(), file_size, file_type: session.file_type.clone(), last_modified: None })
            .await?;
        session.upload_token = Some(initiate.upload_token);
        session.chunk_size = initiate.chunk_size;

        let mut splitter = ChunkSplitter::new(file_path.clone(), session.chunk_size).map_err(ClientError::Splitter)?;
        if !self.config.enable_multi_thread {
            splitter = splitter.with_max_workers(1);
        }
        let split_rx = splitter.split().map_err(ClientError::Splitter)?;

        let scheduler = Arc::new(Scheduler::new(Scheduler::auto_concurrency(self.config.concurrency)));
        *self.active_scheduler.lock().unwrap() = Some(scheduler.clone());
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<ChunkOutcome>();

        let mut completed = false;
        let mut splitter_drained = false;
        let mut scheduler_idle = false;
        let mut result: Option<Result<String>> = None;

        // Forward the splitter's blocking crossbeam channel onto the async
        // world without blocking the orchestration loop.
        let (split_event_tx, mut split_event_rx) = mpsc::unbounded_channel::<SplitEvent>();
        std::thread::spawn(move || {
            while let Ok(event) = split_rx.recv() {
                if split_event_tx.send(event).is_err() {
                    break;
                }
            }
        });

        while !completed {
            tokio::select! {
                Some(event) = split_event_rx.recv() => {
                    match event {
                        SplitEvent::Chunks(batch) => {
                            for digested in batch {
                                let descriptor = ChunkDescriptor { index: digested.index, start: digested.start, end: digested.end, digest: Some(digested.digest) };
                                session.chunks.push(descriptor.clone());
                                if session.status == SessionStatus::Splitting {
                                    self.transition(&mut session, SessionStatus::Uploading, &events);
                                }
                                self.enqueue_chunk(&scheduler, &session, descriptor, outcome_tx.clone());
                            }
                        }
                        SplitEvent::WholeHash(hash) => {
                            session.whole_hash = Some(hash.clone());
                            if let Some(token) = session.upload_token.clone() {
                                match self.transport.verify(&token, &hash, HashKind::File, None).await {
                                    Ok(verify) if verify.has_file => {
                                        if let Some(url) = verify.url {
                                            if !completed {
                                                completed = true;
                                                result = Some(Ok(url.clone()));
                                                self.transition(&mut session, SessionStatus::Completed, &events);
                                                let _ = events.send(UploadEvent::Complete(url));
                                            }
                                        }
                                    }
                                    // `rest` is not consulted here: the server only
                                    // populates `chunks` at merge time (see
                                    // parcel-server's verify.rs), so on an unmerged
                                    // session `rest` is always empty and marking
                                    // chunks uploaded from it would mark all of them
                                    // and race the drain-gated merge below. Preserved
                                    // as-specified (spec.md §9) rather than inferring
                                    // a different intent.
                                    Ok(_) => {}
                                    Err(err) => {
                                        if err.is_fatal() {
                                            completed = true;
                                            self.transition(&mut session, SessionStatus::Error, &events);
                                            let _ = events.send(UploadEvent::error(&err));
                                            result = Some(Err(err));
                                        }
                                    }
                                }
                            }
                        }
                        SplitEvent::Drain => {
                            splitter_drained = true;
                        }
                    }
                }
                Some(outcome) = outcome_rx.recv() => {
                    match outcome {
                        ChunkOutcome::Uploaded { index, bytes } => {
                            self.mark_uploaded(&mut session, index, bytes, &events);
                        }
                        ChunkOutcome::Failed { index, error } => {
                            if !completed {
                                completed = true;
                                result = Some(Err(ClientError::ChunkFailed { index, source: Box::new(error) }));
                                self.transition(&mut session, SessionStatus::Error, &events);
                            }
                        }
                    }
                }
                else => break,
            }

            if !completed && scheduler.is_cancelled() {
                completed = true;
                let _ = events.send(UploadEvent::Error(ClientError::Cancelled.to_string()));
                result = Some(Err(ClientError::Cancelled));
            }

            if !completed && splitter_drained && scheduler.pending() == 0 && scheduler.inflight() == 0 {
                scheduler_idle = true;
            }

            if !completed && scheduler_idle && session.is_fully_uploaded() && session.whole_hash.is_some() {
                completed = true;
                let merge_result = self.do_merge(&session).await;
                match merge_result {
                    Ok(url) => {
                        self.transition(&mut session, SessionStatus::Completed, &events);
                        let _ = events.send(UploadEvent::Complete(url.clone()));
                        result = Some(Ok(url));
                    }
                    Err(err) => {
                        self.transition(&mut session, SessionStatus::Error, &events);
                        let _ = events.send(UploadEvent::error(&err));
                        result = Some(Err(err));
                    }
                }
            }
        }

        *self.active_scheduler.lock().unwrap() = None;
        match Arc::try_unwrap(scheduler) {
            Ok(scheduler) => scheduler.shutdown().await,
            Err(scheduler) => scheduler.cancel(),
        }
        result.unwrap_or_else(|| Err(ClientError::Other("session ended without a result".to_string())))
    }

    async fn do_merge(&self, session: &UploadSession) -> Result<String> {
        let token = session.upload_token.as_ref().ok_or_else(|| ClientError::Other("missing upload token at merge".to_string()))?;
        let hash = session.whole_hash.as_ref().ok_or_else(|| ClientError::Other("missing whole-file hash at merge".to_string()))?;
        let response = self.transport.merge(token, hash, session.ordered_digests()).await?;
        Ok(response.url)
    }

    fn enqueue_chunk(&self, scheduler: &Scheduler, session: &UploadSession, descriptor: ChunkDescriptor, outcome_tx: mpsc::UnboundedSender<ChunkOutcome>) {
        if session.uploaded_chunks.contains(&descriptor.index) {
            let _ = outcome_tx.send(ChunkOutcome::Uploaded { index: descriptor.index, bytes: 0 });
            return;
        }

        let transport = self.transport.clone();
        let token = session.upload_token.clone().expect("upload token set before chunks are enqueued");
        let file_path = session.file_path.clone();
        let backoff = self.backoff;
        let retry_count = self.config.retry_count;
        let breaker = self.circuit_breaker.clone();

        let index = descriptor.index;
        let result_tx = outcome_tx.clone();
        let submitted = scheduler.submit(move || async move {
            let outcome = upload_one_chunk(transport, token, file_path, descriptor, backoff, retry_count, breaker).await;
            let _ = result_tx.send(outcome);
        });

        if let Err(err) = submitted {
            let _ = outcome_tx.send(ChunkOutcome::Failed { index, error: ClientError::Scheduler(err) });
        }
    }

    fn mark_uploaded(&self, session: &mut UploadSession, index: u32, bytes: u64, events: &mpsc::UnboundedSender<UploadEvent>) {
        if session.uploaded_chunks.insert(index) {
            session.uploaded_bytes += bytes;
            session.failed_chunks.remove(&index);
            self.emit_progress(session, events);
        }
    }

    fn transition(&self, session: &mut UploadSession, status: SessionStatus, events: &mpsc::UnboundedSender<UploadEvent>) {
        session.status = status;
        let _ = events.send(UploadEvent::StatusChange(status));
    }

    fn emit_progress(&self, session: &mut UploadSession, events: &mpsc::UnboundedSender<UploadEvent>) {
        let now = Instant::now();
        let elapsed = now.duration_since(session.window_started_at).as_secs_f64();
        let delta_bytes = session.uploaded_bytes.saturating_sub(session.window_started_bytes);
        let speed = if elapsed > 0.0 { delta_bytes as f64 / elapsed } else { 0.0 };

        session.window_started_at = now;
        session.window_started_bytes = session.uploaded_bytes;

        let progress = Progress::compute(session.uploaded_bytes, session.file_size, speed, session.uploaded_chunks.len(), session.total_chunks());
        let _ = events.send(UploadEvent::Progress(progress));
    }
}

async fn upload_one_chunk(
    transport: Arc<dyn TransportAdapter>,
    token: String,
    file_path: PathBuf,
    descriptor: ChunkDescriptor,
    backoff: BackoffPolicy,
    retry_count: u32,
    breaker: CircuitBreaker,
) -> ChunkOutcome {
    let digest = descriptor.digest.clone().unwrap_or_default();

    match transport.verify(&token, &digest, HashKind::Chunk, Some(descriptor.index)).await {
        Ok(verify) if verify.has_file => {
            return ChunkOutcome::Uploaded { index: descriptor.index, bytes: descriptor.len() };
        }
        Err(err) if err.is_fatal() => {
            return ChunkOutcome::Failed { index: descriptor.index, error: err };
        }
        _ => {}
    }

    let mut attempt = 0u32;
    loop {
        match transfer(&transport, &token, &file_path, &descriptor, &breaker).await {
            Ok(()) => return ChunkOutcome::Uploaded { index: descriptor.index, bytes: descriptor.len() },
            Err(err) => {
                if err.is_fatal() || attempt >= retry_count {
                    return ChunkOutcome::Failed { index: descriptor.index, error: err };
                }
                let delay = backoff.delay_for(attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Reads the chunk's bytes and transfers them, routed through the circuit
/// breaker so a server outage fails every in-flight chunk immediately
/// instead of letting each one burn its own retry budget against it.
async fn transfer(
    transport: &Arc<dyn TransportAdapter>,
    token: &str,
    file_path: &Path,
    descriptor: &ChunkDescriptor,
    breaker: &CircuitBreaker,
) -> Result<()> {
    let mut file = tokio::fs::File::open(file_path).await?;
    file.seek(std::io::SeekFrom::Start(descriptor.start)).await?;
    let mut bytes = vec![0u8; descriptor.len() as usize];
    file.read_exact(&mut bytes).await?;

    // `CircuitBreaker::call` is generic over `ResilienceError`, which has no
    // room for the original `ClientError`'s detail; stash it here and
    // recover it after the call so callers still see the real error.
    let original: Arc<StdMutex<Option<ClientError>>> = Arc::new(StdMutex::new(None));
    let original_slot = original.clone();

    let outcome = breaker
        .call(|| {
            let original_slot = original_slot.clone();
            async move {
                transport.transfer_chunk(token, file_path, descriptor, bytes).await.map_err(|err| {
                    let classified = if err.is_fatal() { ResilienceError::Permanent(err.to_string()) } else { ResilienceError::Transient(err.to_string()) };
                    *original_slot.lock().unwrap() = Some(err);
                    classified
                })
            }
        })
        .await;

    outcome.map_err(|breaker_err| {
        original.lock().unwrap().take().unwrap_or_else(|| match breaker_err {
            ResilienceError::CircuitOpen => ClientError::Other("circuit open: too many recent chunk transfer failures".to_string()),
            ResilienceError::Transient(msg) | ResilienceError::Permanent(msg) => ClientError::Other(msg),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InitiateResponse, MergeResponse, VerifyResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockTransport {
        chunk_calls: AtomicUsize,
        merge_calls: AtomicUsize,
        fail_chunk_until: usize,
    }

    impl MockTransport {
        fn new(fail_chunk_until: usize) -> Self {
            Self { chunk_calls: AtomicUsize::new(0), merge_calls: AtomicUsize::new(0), fail_chunk_until }
        }
    }

    #[async_trait::async_trait]
    impl TransportAdapter for MockTransport {
        async fn initiate(&self, _req: InitiateRequest) -> Result<InitiateResponse> {
            Ok(InitiateResponse { upload_token: "token".to_string(), chunk_size: 5 * 1024 * 1024 })
        }

        async fn verify(&self, _token: &str, _hash: &str, kind: HashKind, _chunk_index: Option<u32>) -> Result<VerifyResponse> {
            if kind == HashKind::File {
                return Ok(VerifyResponse { has_file: false, rest: Some(Vec::new()), url: None });
            }
            Ok(VerifyResponse { has_file: false, rest: None, url: None })
        }

        async fn transfer_chunk(&self, _token: &str, _file_path: &std::path::Path, _descriptor: &ChunkDescriptor, _bytes: Vec<u8>) -> Result<()> {
            let n = self.chunk_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_chunk_until {
                return Err(ClientError::Other("simulated transient failure".to_string()));
            }
            Ok(())
        }

        async fn merge(&self, _token: &str, _file_hash: &str, _chunks: Vec<String>) -> Result<MergeResponse> {
            self.merge_calls.fetch_add(1, Ordering::SeqCst);
            Ok(MergeResponse { url: "/api/upload/file/x/f.bin".to_string() })
        }
    }

    #[test]
    fn backoff_is_derived_from_configured_retry_count() {
        let config = crate::config::UploadConfig { retry_count: 3, retry_delay_ms: 10, ..Default::default() };
        let controller = UploadController::new(config, Arc::new(MockTransport::new(0)));
        assert_eq!(controller.backoff.max_attempts(), 4);
    }

    #[tokio::test]
    async fn small_single_chunk_file_completes_and_merges_once() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("small.bin");
        tokio::fs::write(&file_path, vec![0xAAu8; 1024]).await.unwrap();

        let transport = Arc::new(MockTransport::new(0));
        let config = crate::config::UploadConfig { chunk_size: 5 * 1024 * 1024, concurrency: 2, retry_count: 3, retry_delay_ms: 1, ..Default::default() };
        let controller = UploadController::new(config, transport.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = controller.run(file_path, tx).await.unwrap();

        assert_eq!(url, "/api/upload/file/x/f.bin");
        assert_eq!(transport.merge_calls.load(Ordering::SeqCst), 1);

        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, UploadEvent::Complete(_)) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn chunk_retries_under_the_cap_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("small.bin");
        tokio::fs::write(&file_path, vec![0x11u8; 2048]).await.unwrap();

        // Fails twice, succeeds on the third attempt; retry_count of 3 covers it.
        let transport = Arc::new(MockTransport::new(2));
        let config = crate::config::UploadConfig { chunk_size: 5 * 1024 * 1024, concurrency: 1, retry_count: 3, retry_delay_ms: 1, ..Default::default() };
        let controller = UploadController::new(config, transport.clone());

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = controller.run(file_path, tx).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn chunk_exhausting_retries_yields_error_without_merging() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("small.bin");
        tokio::fs::write(&file_path, vec![0x22u8; 2048]).await.unwrap();

        // Always fails: exceeds retry_count of 1.
        let transport = Arc::new(MockTransport::new(usize::MAX));
        let config = crate::config::UploadConfig { chunk_size: 5 * 1024 * 1024, concurrency: 1, retry_count: 1, retry_delay_ms: 1, ..Default::default() };
        let controller = UploadController::new(config, transport.clone());

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = controller.run(file_path, tx).await;
        assert!(result.is_err());
        assert_eq!(transport.merge_calls.load(Ordering::SeqCst), 0);
    }
}
