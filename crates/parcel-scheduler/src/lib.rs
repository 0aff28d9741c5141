//! Bounded-concurrency async task scheduler.
//!
//! A pool of worker loops pulls boxed tasks off a single FIFO queue, so
//! submission order is preserved end to end: whichever task was submitted
//! first is the first one a free worker picks up. Concurrency is bounded by
//! the number of live workers rather than a semaphore, which keeps
//! pause/resume/cancel simple — they are just flags the workers check
//! between tasks (or are woken out of an empty queue to check). Resizing the
//! pool (`set_concurrency`) follows the same discipline: widening spawns
//! workers immediately, narrowing lets surplus workers shed themselves the
//! next time they are between tasks.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
type Task = Box<dyn FnOnce() -> BoxFuture<'static> + Send>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler has been cancelled")]
    Cancelled,
}

struct Shared {
    paused: AtomicBool,
    cancelled: AtomicBool,
    pending: AtomicUsize,
    inflight: AtomicUsize,
    worker_count: AtomicUsize,
    target_workers: AtomicUsize,
    wake: Notify,
    idle: Notify,
    queue: StdMutex<VecDeque<Task>>,
}

/// A bounded-concurrency queue of async tasks, dispatched FIFO to at most
/// `concurrency` workers at a time.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let shared = Arc::new(Shared {
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            worker_count: AtomicUsize::new(concurrency),
            target_workers: AtomicUsize::new(concurrency),
            wake: Notify::new(),
            idle: Notify::new(),
            queue: StdMutex::new(VecDeque::new()),
        });

        let mut workers = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            workers.push(tokio::spawn(worker_loop(shared.clone())));
        }

        Self { shared, workers: StdMutex::new(workers) }
    }

    /// Number of CPU-derived workers a caller would typically want, mirroring
    /// the auto-detect convention used elsewhere: `0` means "pick for me".
    pub fn auto_concurrency(requested: usize) -> usize {
        if requested == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            requested
        }
    }

    /// Queue a task for execution. Tasks run strictly in submission order
    /// relative to one another, bounded by the worker pool size. Equivalent
    /// to the reference's `add`/`addAndStart`: a freshly constructed
    /// scheduler starts out running, so the first `submit` dispatches as
    /// soon as a worker is free.
    pub fn submit<F, Fut>(&self, task: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return Err(SchedulerError::Cancelled);
        }
        let boxed: Task = Box::new(move || Box::pin(task()) as BoxFuture<'static>);
        self.shared.queue.lock().unwrap().push_back(boxed);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.wake.notify_waiters();
        Ok(())
    }

    /// Stop dispatching new tasks. Tasks already in flight continue to
    /// completion; queued-but-unstarted tasks stay queued.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    /// Resume dispatching tasks that were held back by [`pause`](Self::pause).
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.wake.notify_waiters();
    }

    /// Alias for [`resume`](Self::resume), matching the reference's `start()`.
    pub fn start(&self) {
        self.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Drop every task not yet picked up by a worker and pause dispatch.
    /// Unlike [`cancel`](Self::cancel) this is not terminal: the scheduler
    /// keeps accepting [`submit`](Self::submit) calls and resumes normal
    /// dispatch on the next [`resume`](Self::resume)/[`start`](Self::start).
    pub fn clear(&self) {
        self.pause();
        let dropped = {
            let mut queue = self.shared.queue.lock().unwrap();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            self.shared.pending.fetch_sub(dropped, Ordering::SeqCst);
        }
        self.shared.idle.notify_waiters();
    }

    /// Stop dispatching new tasks permanently and discard anything still
    /// queued. Tasks already in flight are left to finish; further calls to
    /// [`submit`](Self::submit) return [`SchedulerError::Cancelled`].
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.wake.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Resize the live worker pool. Takes effect immediately: widening spawns
    /// the extra workers right away, which may trigger new dispatches out of
    /// whatever is already queued; narrowing never cancels in-flight work —
    /// surplus workers shed themselves the next time they are between tasks.
    pub fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.max(1);
        self.shared.target_workers.store(concurrency, Ordering::SeqCst);

        let mut workers = self.workers.lock().unwrap();
        let current = self.shared.worker_count.load(Ordering::SeqCst);
        for _ in current..concurrency {
            self.shared.worker_count.fetch_add(1, Ordering::SeqCst);
            workers.push(tokio::spawn(worker_loop(self.shared.clone())));
        }
        drop(workers);

        self.shared.wake.notify_waiters();
    }

    /// Number of live workers, including any still winding down after a
    /// narrowing [`set_concurrency`](Self::set_concurrency) call.
    pub fn concurrency(&self) -> usize {
        self.shared.worker_count.load(Ordering::SeqCst)
    }

    /// Number of tasks submitted but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Number of tasks currently running.
    pub fn inflight(&self) -> usize {
        self.shared.inflight.load(Ordering::SeqCst)
    }

    /// Wait until every task submitted so far has finished running.
    /// Resolves immediately if the queue is already idle.
    pub async fn drain(&self) {
        loop {
            // Register interest before re-checking the zero condition:
            // `idle` is signalled with `notify_waiters`, which only wakes
            // waiters already registered at the time it fires. Checking
            // first and constructing the `notified()` future second would
            // leave a window where the last task's completion notification
            // lands before we start waiting for it, and `drain` would park
            // forever.
            let idle = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0
                && self.shared.inflight.load(Ordering::SeqCst) == 0
            {
                return;
            }
            idle.await;
        }
    }

    /// Cancel, stop accepting work, and wait for all worker loops to exit.
    pub async fn shutdown(self) {
        self.cancel();
        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    loop {
        if shed_if_over_target(&shared) {
            return;
        }

        if shared.cancelled.load(Ordering::SeqCst) {
            drain_remaining(&shared);
            return;
        }

        if shared.paused.load(Ordering::SeqCst) {
            // Register interest before re-checking the flag: `notify_waiters`
            // only wakes waiters that already exist, so constructing the
            // future after the check would risk missing a `resume()` that
            // lands in between.
            let notified = shared.wake.notified();
            if shared.paused.load(Ordering::SeqCst) {
                notified.await;
            }
            continue;
        }

        // Same register-before-check order as above: a task pushed by
        // `submit` between our queue check and an unregistered wait would
        // otherwise be missed until some unrelated wakeup.
        let notified = shared.wake.notified();
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            queue.pop_front()
        };

        let Some(task) = task else {
            notified.await;
            continue;
        };

        shared.pending.fetch_sub(1, Ordering::SeqCst);
        shared.inflight.fetch_add(1, Ordering::SeqCst);
        task().await;
        shared.inflight.fetch_sub(1, Ordering::SeqCst);
        shared.idle.notify_waiters();
    }
}

/// Returns `true` (and decrements `worker_count`) when this worker is
/// surplus to `target_workers` and should exit. Only ever shrinks the
/// pool between tasks, never mid-task, so narrowing never cancels
/// in-flight work.
fn shed_if_over_target(shared: &Shared) -> bool {
    loop {
        let target = shared.target_workers.load(Ordering::SeqCst);
        let current = shared.worker_count.load(Ordering::SeqCst);
        if current <= target {
            return false;
        }
        if shared
            .worker_count
            .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return true;
        }
    }
}

fn drain_remaining(shared: &Shared) {
    let mut queue = shared.queue.lock().unwrap();
    let dropped = queue.len();
    queue.clear();
    drop(queue);
    if dropped > 0 {
        shared.pending.fetch_sub(dropped, Ordering::SeqCst);
    }
    shared.idle.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;
    use tokio::sync::Mutex as TokioMutex;

    #[tokio::test]
    async fn respects_concurrency_cap() {
        let scheduler = Scheduler::new(3);
        let current = Arc::new(StdAtomicUsize::new(0));
        let peak = Arc::new(StdAtomicUsize::new(0));

        for _ in 0..12 {
            let current = current.clone();
            let peak = peak.clone();
            scheduler
                .submit(move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        scheduler.drain().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn dispatches_fifo_under_single_worker() {
        let scheduler = Scheduler::new(1);
        let order = Arc::new(TokioMutex::new(Vec::new()));

        for i in 0..10 {
            let order = order.clone();
            scheduler
                .submit(move || async move {
                    order.lock().await.push(i);
                })
                .unwrap();
        }

        scheduler.drain().await;
        let observed = order.lock().await.clone();
        assert_eq!(observed, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn pause_blocks_further_dispatch() {
        let scheduler = Scheduler::new(1);
        let ran = Arc::new(StdAtomicUsize::new(0));

        scheduler.pause();
        let ran_clone = ran.clone();
        scheduler
            .submit(move || async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);

        scheduler.resume();
        scheduler.drain().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_rejects_new_submissions_and_drops_queued_work() {
        let scheduler = Scheduler::new(1);
        scheduler.pause();

        let ran = Arc::new(StdAtomicUsize::new(0));
        for _ in 0..5 {
            let ran = ran.clone();
            scheduler
                .submit(move || async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        scheduler.cancel();
        assert!(scheduler.is_cancelled());
        assert!(scheduler
            .submit(|| async {})
            .is_err());

        scheduler.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drain_resolves_immediately_when_idle() {
        let scheduler = Scheduler::new(2);
        scheduler.drain().await;
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.inflight(), 0);
    }

    #[tokio::test]
    async fn clear_drops_pending_work_without_cancelling_the_scheduler() {
        let scheduler = Scheduler::new(1);
        scheduler.pause();

        let ran = Arc::new(StdAtomicUsize::new(0));
        for _ in 0..4 {
            let ran = ran.clone();
            scheduler.submit(move || async move { ran.fetch_add(1, Ordering::SeqCst); }).unwrap();
        }
        assert_eq!(scheduler.pending(), 4);

        scheduler.clear();
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.is_paused());
        assert!(!scheduler.is_cancelled());

        // The scheduler is still usable after clear(): new work runs once resumed.
        scheduler.submit(move || async move { ran.fetch_add(1, Ordering::SeqCst); }).unwrap();
        scheduler.start();
        scheduler.drain().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn set_concurrency_widens_the_live_worker_pool() {
        let scheduler = Scheduler::new(1);
        assert_eq!(scheduler.concurrency(), 1);

        scheduler.set_concurrency(4);
        assert_eq!(scheduler.concurrency(), 4);

        let current = Arc::new(StdAtomicUsize::new(0));
        let peak = Arc::new(StdAtomicUsize::new(0));
        for _ in 0..8 {
            let current = current.clone();
            let peak = peak.clone();
            scheduler
                .submit(move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        scheduler.drain().await;
        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn set_concurrency_narrows_without_cancelling_inflight_work() {
        let scheduler = Scheduler::new(3);
        let ran = Arc::new(StdAtomicUsize::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            scheduler
                .submit(move || async move {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        // Give workers a moment to pick up the in-flight tasks, then narrow.
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.set_concurrency(1);

        scheduler.drain().await;
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.concurrency(), 1);
    }
}
