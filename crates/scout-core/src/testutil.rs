//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::traits::{BrowserSession, ModelServer, Pacer, SessionFactory};

// ---------------------------------------------------------------------------
// Session event log
// ---------------------------------------------------------------------------

/// Operations a [`MockSession`] records, tagged with the session's identity
/// so tests can verify which session performed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    SetTimeout,
    Navigate,
    WaitReady,
    WindowSize,
    Screenshot,
    PageSource,
    Close,
}

/// Shared log of `(session_id, operation)` pairs across all sessions a
/// factory creates. Session ids start at 1 in creation order.
#[derive(Debug, Clone, Default)]
pub struct SessionEventLog {
    events: Arc<Mutex<Vec<(u32, SessionOp)>>>,
}

impl SessionEventLog {
    fn record(&self, session_id: u32, op: SessionOp) {
        self.events.lock().unwrap().push((session_id, op));
    }

    /// Ids of the sessions that performed `op`, in order of occurrence.
    pub fn sessions_for(&self, op: SessionOp) -> Vec<u32> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| *o == op)
            .map(|(id, _)| *id)
            .collect()
    }

    fn count(&self, op: SessionOp) -> usize {
        self.sessions_for(op).len()
    }

    pub fn navigate_count(&self) -> usize {
        self.count(SessionOp::Navigate)
    }

    pub fn screenshot_count(&self) -> usize {
        self.count(SessionOp::Screenshot)
    }

    pub fn page_source_count(&self) -> usize {
        self.count(SessionOp::PageSource)
    }
}

// ---------------------------------------------------------------------------
// MockSession / MockSessionFactory
// ---------------------------------------------------------------------------

/// Mock browser session with scripted outcomes.
///
/// Navigation results pop from a queue shared across all sessions of the
/// owning factory (empty queue means success), so a script spans session
/// restarts the way a flaky site spans them in production.
pub struct MockSession {
    id: u32,
    log: SessionEventLog,
    navigation_script: Arc<Mutex<Vec<Result<(), AppError>>>>,
    page_source: Arc<Mutex<String>>,
    screenshot_error: Arc<Mutex<Option<AppError>>>,
    page_source_error: Arc<Mutex<Option<AppError>>>,
}

impl BrowserSession for MockSession {
    fn set_page_load_timeout(&self, _timeout: Duration) {
        self.log.record(self.id, SessionOp::SetTimeout);
    }

    async fn navigate(&self, _url: &str) -> Result<(), AppError> {
        self.log.record(self.id, SessionOp::Navigate);
        let mut script = self.navigation_script.lock().unwrap();
        if script.is_empty() {
            Ok(())
        } else {
            script.remove(0)
        }
    }

    async fn wait_until_ready(&self) -> Result<(), AppError> {
        self.log.record(self.id, SessionOp::WaitReady);
        Ok(())
    }

    async fn set_window_size(&self, _width: u32, _height: u32) -> Result<(), AppError> {
        self.log.record(self.id, SessionOp::WindowSize);
        Ok(())
    }

    async fn save_screenshot(&self, _path: &Path) -> Result<(), AppError> {
        self.log.record(self.id, SessionOp::Screenshot);
        let mut err = self.screenshot_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(())
    }

    async fn page_source(&self) -> Result<String, AppError> {
        self.log.record(self.id, SessionOp::PageSource);
        let mut err = self.page_source_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(self.page_source.lock().unwrap().clone())
    }

    async fn close(self) {
        self.log.record(self.id, SessionOp::Close);
    }
}

/// Factory producing [`MockSession`]s with incrementing identities.
#[derive(Clone, Default)]
pub struct MockSessionFactory {
    counter: Arc<Mutex<u32>>,
    log: SessionEventLog,
    navigation_script: Arc<Mutex<Vec<Result<(), AppError>>>>,
    page_source: Arc<Mutex<String>>,
    screenshot_error: Arc<Mutex<Option<AppError>>>,
    page_source_error: Arc<Mutex<Option<AppError>>>,
    open_error: Arc<Mutex<Option<AppError>>>,
}

impl MockSessionFactory {
    /// Factory whose sessions succeed at everything.
    pub fn new() -> Self {
        Self {
            page_source: Arc::new(Mutex::new("<html><body>default</body></html>".to_string())),
            ..Self::default()
        }
    }

    /// Factory whose sessions consume `script` for navigation outcomes.
    pub fn with_navigation_script(script: Vec<Result<(), AppError>>) -> Self {
        Self {
            navigation_script: Arc::new(Mutex::new(script)),
            ..Self::new()
        }
    }

    /// Markup all sessions return from `page_source`.
    pub fn with_page_source(self, source: &str) -> Self {
        *self.page_source.lock().unwrap() = source.to_string();
        self
    }

    /// Fail the next screenshot with `error`.
    pub fn with_screenshot_error(self, error: AppError) -> Self {
        *self.screenshot_error.lock().unwrap() = Some(error);
        self
    }

    /// Fail the next page-source read with `error`.
    pub fn with_page_source_error(self, error: AppError) -> Self {
        *self.page_source_error.lock().unwrap() = Some(error);
        self
    }

    /// Fail the next session open with `error`.
    pub fn with_open_error(self, error: AppError) -> Self {
        *self.open_error.lock().unwrap() = Some(error);
        self
    }

    /// The shared event log, for assertions.
    pub fn events(&self) -> SessionEventLog {
        self.log.clone()
    }

    /// How many sessions this factory has opened.
    pub fn sessions_opened(&self) -> u32 {
        *self.counter.lock().unwrap()
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    async fn open(&self) -> Result<MockSession, AppError> {
        let mut err = self.open_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        drop(err);

        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        Ok(MockSession {
            id: *counter,
            log: self.log.clone(),
            navigation_script: Arc::clone(&self.navigation_script),
            page_source: Arc::clone(&self.page_source),
            screenshot_error: Arc::clone(&self.screenshot_error),
            page_source_error: Arc::clone(&self.page_source_error),
        })
    }
}

// ---------------------------------------------------------------------------
// MockModelServer
// ---------------------------------------------------------------------------

/// Mock model server with scripted probe outcomes and a recorded pull log.
#[derive(Clone, Default)]
pub struct MockModelServer {
    refuse_all: bool,
    probe_script: Arc<Mutex<Vec<Result<(), AppError>>>>,
    probe_calls: Arc<Mutex<u32>>,
    pulled: Arc<Mutex<Vec<String>>>,
    pull_error: Arc<Mutex<Option<AppError>>>,
}

impl MockModelServer {
    /// Server that is reachable immediately.
    pub fn ready() -> Self {
        Self::default()
    }

    /// Server that refuses every connection, forever.
    pub fn unreachable() -> Self {
        Self {
            refuse_all: true,
            ..Self::default()
        }
    }

    /// Server that consumes `script` for probe outcomes (empty means
    /// reachable).
    pub fn with_probe_script(script: Vec<Result<(), AppError>>) -> Self {
        Self {
            probe_script: Arc::new(Mutex::new(script)),
            ..Self::default()
        }
    }

    /// Fail the next pull with `error`.
    pub fn with_pull_error(self, error: AppError) -> Self {
        *self.pull_error.lock().unwrap() = Some(error);
        self
    }

    pub fn probe_count(&self) -> u32 {
        *self.probe_calls.lock().unwrap()
    }

    pub fn pull_count(&self) -> usize {
        self.pulled.lock().unwrap().len()
    }

    pub fn pulled_models(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }
}

impl ModelServer for MockModelServer {
    async fn probe_version(&self) -> Result<(), AppError> {
        *self.probe_calls.lock().unwrap() += 1;
        if self.refuse_all {
            return Err(AppError::NetworkError("connection refused".into()));
        }
        let mut script = self.probe_script.lock().unwrap();
        if script.is_empty() {
            Ok(())
        } else {
            script.remove(0)
        }
    }

    async fn pull_model(&self, name: &str) -> Result<(), AppError> {
        let mut err = self.pull_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        self.pulled.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingPacer
// ---------------------------------------------------------------------------

/// Pacer that records requested sleep durations and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingPacer {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded sleeps, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Pacer for RecordingPacer {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
