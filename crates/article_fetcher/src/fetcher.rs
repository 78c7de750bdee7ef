//! The section fetch contract.
//!
//! Callbacks for one fetch run on a worker thread of the fetcher's tokio
//! runtime, from the single task that performs the fetch. They are never
//! invoked concurrently with each other, and every progress callback precedes
//! the completion callback.
//!
//! Cancelling a fetch before it completes drops the in-flight request, stops
//! further progress and completes exactly once with
//! [`FailureKind::Cancelled`](crate::FailureKind::Cancelled). Cancelling after
//! completion has no effect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fetch_logging::{fetch_debug, fetch_info, fetch_warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::delivery::{DownloadSink, ProgressReporter};
use crate::{
    decode_sections, sections_request_url, Article, DataStore, FailureKind, FetchError,
    HttpManager, Title,
};

pub type FetchId = u64;

struct InFlight {
    title: Title,
    token: CancellationToken,
}

#[derive(Default)]
struct Registry {
    inflight: Mutex<HashMap<FetchId, InFlight>>,
}

impl Registry {
    fn insert(&self, id: FetchId, title: &Title, token: CancellationToken) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.insert(
                id,
                InFlight {
                    title: title.clone(),
                    token,
                },
            );
        }
    }

    fn remove(&self, id: FetchId) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&id);
        }
    }

    fn contains_page(&self, title: &Title) -> bool {
        self.inflight
            .lock()
            .map(|inflight| inflight.values().any(|entry| entry.title.same_page(title)))
            .unwrap_or(false)
    }

    /// Tokens are cancelled after the lock is released.
    fn tokens_matching(&self, title: Option<&Title>) -> Vec<CancellationToken> {
        let Ok(inflight) = self.inflight.lock() else {
            return Vec::new();
        };
        inflight
            .values()
            .filter(|entry| title.is_none_or(|title| entry.title.same_page(title)))
            .map(|entry| entry.token.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.inflight.lock().map(|inflight| inflight.len()).unwrap_or(0)
    }
}

/// Fetches article sections and tracks the fetches it started.
///
/// Dropping the fetcher cancels every fetch that is still in flight.
pub struct ArticleFetcher {
    runtime: Handle,
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

impl ArticleFetcher {
    /// Fetches will be spawned onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Uses the runtime of the calling context, if any.
    pub fn from_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Start fetching every section of `title`.
    ///
    /// Returns immediately. `on_progress` receives fractions in `[0.0, 1.0]`
    /// zero or more times; `on_completion` is called exactly once afterwards.
    /// On success the article has already been saved into `store`.
    pub fn fetch_sections<P, C>(
        &self,
        title: Title,
        store: Arc<dyn DataStore>,
        manager: Arc<dyn HttpManager>,
        on_progress: P,
        on_completion: C,
    ) -> FetchHandle
    where
        P: FnMut(f64) + Send + 'static,
        C: FnOnce(Result<Article, FetchError>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        self.registry.insert(id, &title, token.clone());

        let registry = self.registry.clone();
        let task_token = token.clone();
        let task_title = title.clone();
        let task_finished = finished.clone();
        let task = self.runtime.spawn(async move {
            let reporter = ProgressReporter::new(on_progress, task_token.clone());
            let result = drive(
                &task_title,
                store.as_ref(),
                manager.as_ref(),
                &reporter,
                &task_token,
            )
            .await;
            reporter.close();
            registry.remove(id);
            log_outcome(id, &task_title, &result);
            on_completion(result);
            task_finished.store(true, Ordering::Release);
        });

        FetchHandle {
            id,
            title,
            token,
            finished,
            task,
        }
    }

    /// Same pipeline as [`fetch_sections`](Self::fetch_sections), on the
    /// caller's task. Dropping the future abandons the fetch.
    pub async fn fetch_sections_async<P>(
        &self,
        title: &Title,
        store: &dyn DataStore,
        manager: &dyn HttpManager,
        on_progress: P,
    ) -> Result<Article, FetchError>
    where
        P: FnMut(f64) + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.registry.insert(id, title, token.clone());
        let _deregister = Deregister {
            registry: &self.registry,
            id,
        };

        let reporter = ProgressReporter::new(on_progress, token.clone());
        let result = drive(title, store, manager, &reporter, &token).await;
        reporter.close();
        log_outcome(id, title, &result);
        result
    }

    /// Whether a fetch for the page of `title` is in flight.
    pub fn is_fetching(&self, title: &Title) -> bool {
        self.registry.contains_page(title)
    }

    /// Number of fetches in flight.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Cancel every in-flight fetch for the page of `title`.
    pub fn cancel_fetch_for_title(&self, title: &Title) -> usize {
        let tokens = self.registry.tokens_matching(Some(title));
        for token in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            fetch_info!("Cancelled {} fetch(es) for {}", tokens.len(), title);
        }
        tokens.len()
    }

    pub fn cancel_all_fetches(&self) -> usize {
        let tokens = self.registry.tokens_matching(None);
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }
}

impl Drop for ArticleFetcher {
    fn drop(&mut self) {
        let cancelled = self.cancel_all_fetches();
        if cancelled > 0 {
            fetch_debug!("Fetcher dropped with {} fetch(es) in flight", cancelled);
        }
    }
}

struct Deregister<'a> {
    registry: &'a Registry,
    id: FetchId,
}

impl Drop for Deregister<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Runs the pipeline unless cancelled first. A cancellation that lands after
/// the pipeline finished but before delivery still wins.
async fn drive(
    title: &Title,
    store: &dyn DataStore,
    manager: &dyn HttpManager,
    reporter: &ProgressReporter<'_>,
    token: &CancellationToken,
) -> Result<Article, FetchError> {
    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Err(FetchError::cancelled()),
        result = run_pipeline(title, store, manager, reporter) => result,
    };
    if token.is_cancelled() {
        return Err(FetchError::cancelled());
    }
    result
}

async fn run_pipeline(
    title: &Title,
    store: &dyn DataStore,
    manager: &dyn HttpManager,
    reporter: &ProgressReporter<'_>,
) -> Result<Article, FetchError> {
    let url = sections_request_url(title);
    fetch_info!("Fetching sections for {}", title);

    let sink = DownloadSink { reporter };
    let response = manager.get(&url, &sink).await?;
    fetch_debug!(
        "Received {} for {} (redirects={})",
        fetch_logging::human_bytes(response.metadata.byte_len),
        title,
        response.metadata.redirect_count
    );

    let article = decode_sections(title, &response.bytes)?;
    store
        .save_article(&article)
        .map_err(|err| FetchError::new(FailureKind::Storage, err.to_string()))?;

    reporter.report(1.0);
    Ok(article)
}

fn log_outcome(id: FetchId, title: &Title, result: &Result<Article, FetchError>) {
    match result {
        Ok(article) => fetch_info!(
            "Fetch {} for {} completed with {} section(s)",
            id,
            title,
            article.sections.len()
        ),
        Err(err) if err.is_cancelled() => fetch_info!("Fetch {} for {} cancelled", id, title),
        Err(err) => fetch_warn!("Fetch {} for {} failed: {}", id, title, err),
    }
}

/// Token for one fetch started by [`ArticleFetcher::fetch_sections`].
///
/// Dropping the handle does not cancel the fetch.
#[derive(Debug)]
pub struct FetchHandle {
    id: FetchId,
    title: Title,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FetchHandle {
    pub fn id(&self) -> FetchId {
        self.id
    }

    pub fn title(&self) -> &Title {
        &self.title
    }

    pub fn cancel(&self) {
        if !self.is_finished() {
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the completion callback has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Cloned token, cancelling it is equivalent to [`cancel`](Self::cancel).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait until the completion callback has returned.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            fetch_warn!("Fetch {} for {} task failed: {}", self.id, self.title, err);
        }
    }
}
