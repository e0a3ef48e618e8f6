use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;

/// One live connection to a browser-automation driver controlling a single
/// browser instance.
///
/// A session is acquired through a [`SessionFactory`] and released with
/// [`close`](Self::close); the fetch loop discards and replaces it wholesale
/// on navigation failures rather than trying to repair it.
pub trait BrowserSession: Send + Sync {
    /// Set the timeout applied to [`navigate`](Self::navigate) and
    /// [`wait_until_ready`](Self::wait_until_ready).
    fn set_page_load_timeout(&self, timeout: Duration);

    /// Navigate the session's page to `url`.
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Block until the page's ready-state reports "complete", bounded by the
    /// configured page-load timeout.
    fn wait_until_ready(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Force the browser viewport to the given dimensions.
    fn set_window_size(
        &self,
        width: u32,
        height: u32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Capture a screenshot of the current page to `path`.
    fn save_screenshot(&self, path: &Path) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Return the current page's serialized markup.
    fn page_source(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Tear the session down. Best-effort: teardown failures are swallowed
    /// by implementations and never surface to the caller.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Creates browser sessions. One factory is shared by a fetcher across
/// session restarts.
pub trait SessionFactory: Send + Sync {
    type Session: BrowserSession;

    /// Launch the driver/browser and open a fresh session.
    fn open(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// The model-serving endpoint's lifecycle surface: readiness probe and
/// model pull.
pub trait ModelServer: Send + Sync {
    /// Probe the server's version endpoint. Any HTTP response counts as
    /// success; only connection-level failures return
    /// [`AppError::NetworkError`].
    fn probe_version(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Ask the server to download the named model (a no-op server-side if
    /// the model is already cached).
    fn pull_model(&self, name: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Sends a classification prompt to a language model and returns the
/// textual response.
pub trait Classifier: Send + Sync {
    fn categorize(
        &self,
        task: &str,
        input_data: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Injectable clock for backoff and polling waits, so retry schedules can
/// be asserted in tests without real sleeps.
pub trait Pacer: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Production pacer backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

impl Pacer for TokioPacer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
