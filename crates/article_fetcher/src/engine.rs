use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use fetch_logging::{fetch_debug, fetch_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{Article, ArticleFetcher, DataStore, FetchError, FetchHandle, HttpManager, Title};

pub type JobId = u64;

/// How long [`EngineHandle::shutdown`] waits for cancelled jobs to complete.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DRAIN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress {
        job_id: JobId,
        fraction: f64,
    },
    Completed {
        job_id: JobId,
        result: Result<Article, FetchError>,
    },
}

/// Owns a runtime and turns fetch callbacks into events on a channel.
///
/// Meant for synchronous callers; dropping it inside an async context panics
/// like dropping any tokio runtime there. Use [`EngineHandle::shutdown`] in
/// that case.
pub struct EngineHandle {
    // Declared before the runtime so outstanding fetches are cancelled first.
    fetcher: ArticleFetcher,
    runtime: tokio::runtime::Runtime,
    store: Arc<dyn DataStore>,
    manager: Arc<dyn HttpManager>,
    jobs: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    // Jobs whose completion event has not been sent yet.
    pending: Arc<AtomicUsize>,
    event_tx: mpsc::Sender<EngineEvent>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(
        store: Arc<dyn DataStore>,
        manager: Arc<dyn HttpManager>,
    ) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("article-fetcher")
            .build()?;
        let fetcher = ArticleFetcher::new(runtime.handle().clone());
        let (event_tx, event_rx) = mpsc::channel();
        Ok(Self {
            fetcher,
            runtime,
            store,
            manager,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(AtomicUsize::new(0)),
            event_tx,
            event_rx,
        })
    }

    pub fn fetcher(&self) -> &ArticleFetcher {
        &self.fetcher
    }

    pub fn enqueue(&self, job_id: JobId, title: Title) -> FetchHandle {
        fetch_debug!("Enqueue job_id={} title={}", job_id, title);
        let progress_tx = self.event_tx.clone();
        let completion_tx = self.event_tx.clone();
        let jobs = self.jobs.clone();
        let pending = PendingJob::start(&self.pending);

        // Held across the spawn so the completion callback cannot remove the
        // job before it is inserted.
        let mut tracked = self.jobs.lock().ok();
        let handle = self.fetcher.fetch_sections(
            title,
            self.store.clone(),
            self.manager.clone(),
            move |fraction| {
                let _ = progress_tx.send(EngineEvent::Progress { job_id, fraction });
            },
            move |result| {
                if let Ok(mut jobs) = jobs.lock() {
                    jobs.remove(&job_id);
                }
                let _ = completion_tx.send(EngineEvent::Completed { job_id, result });
                drop(pending);
            },
        );
        if let Some(jobs) = tracked.as_mut() {
            jobs.insert(job_id, handle.cancellation_token());
        }
        drop(tracked);
        handle
    }

    /// Returns whether a running job was found.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let token = self
            .jobs
            .lock()
            .ok()
            .and_then(|mut jobs| jobs.remove(&job_id));
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Cancel every job, wait briefly for their completion events and stop
    /// the runtime.
    ///
    /// Returns the events not yet received, each outstanding job ending with
    /// its `Completed` event. A job still running after the grace period is
    /// abandoned without one.
    pub fn shutdown(self) -> Vec<EngineEvent> {
        let cancelled = self.fetcher.cancel_all_fetches();
        if cancelled > 0 {
            fetch_debug!("Shutdown cancelled {} job(s)", cancelled);
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let mut events = Vec::new();
        while self.pending.load(Ordering::Acquire) > 0 {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                fetch_warn!(
                    "Shutdown abandoned {} job(s) without completion",
                    self.pending.load(Ordering::Acquire)
                );
                break;
            };
            if let Ok(event) = self.event_rx.recv_timeout(remaining.min(DRAIN_POLL)) {
                events.push(event);
            }
        }
        events.extend(self.event_rx.try_iter());

        let Self {
            fetcher, runtime, ..
        } = self;
        drop(fetcher);
        runtime.shutdown_background();
        events
    }
}

/// Counts a job as pending until its completion callback is called or dropped
/// unused.
struct PendingJob(Arc<AtomicUsize>);

impl PendingJob {
    fn start(pending: &Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::AcqRel);
        Self(pending.clone())
    }
}

impl Drop for PendingJob {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
