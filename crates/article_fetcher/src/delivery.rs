use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::{ProgressSink, TransferProgress};

/// Share of the progress range covered by the download; the rest is decoding
/// and storing.
pub(crate) const DOWNLOAD_WEIGHT: f64 = 0.9;

struct ReporterState<'a> {
    callback: Box<dyn FnMut(f64) + Send + 'a>,
    last: Option<f64>,
    closed: bool,
}

/// Forwards progress fractions to a caller callback.
///
/// Values are clamped into `[0.0, 1.0]`, never decrease and are not repeated.
/// Nothing is forwarded once the token is cancelled or the reporter is closed.
pub(crate) struct ProgressReporter<'a> {
    state: Mutex<ReporterState<'a>>,
    token: CancellationToken,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(callback: impl FnMut(f64) + Send + 'a, token: CancellationToken) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                callback: Box::new(callback),
                last: None,
                closed: false,
            }),
            token,
        }
    }

    pub(crate) fn report(&self, fraction: f64) {
        if fraction.is_nan() || self.token.is_cancelled() {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.closed {
            return;
        }
        let value = fraction.clamp(0.0, 1.0);
        if state.last.is_some_and(|last| value <= last) {
            return;
        }
        state.last = Some(value);
        (state.callback)(value);
    }

    /// Stop forwarding progress. Called before completion is delivered.
    pub(crate) fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }
}

/// Maps byte progress from the manager onto the download share of the range.
pub(crate) struct DownloadSink<'r, 'a> {
    pub(crate) reporter: &'r ProgressReporter<'a>,
}

impl ProgressSink for DownloadSink<'_, '_> {
    fn emit(&self, progress: TransferProgress) {
        if let Some(fraction) = progress.fraction() {
            self.reporter.report(fraction * DOWNLOAD_WEIGHT);
        }
    }
}
