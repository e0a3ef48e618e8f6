use std::path::Path;
use std::time::Duration;

use crate::error::AppError;
use crate::traits::{BrowserSession, Pacer, SessionFactory, TokioPacer};

/// Viewport forced before every screenshot.
const SCREENSHOT_WIDTH: u32 = 1920;
const SCREENSHOT_HEIGHT: u32 = 1080;

/// Configuration for a [`PageFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Skip navigation entirely when a file already exists at the
    /// screenshot path.
    pub use_cache: bool,
    /// Total navigation attempts per fetch call. Must be at least 1.
    pub max_retries: u32,
    /// Bound on navigation and on the ready-state wait. Must be non-zero.
    pub page_load_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: false,
            max_retries: 3,
            page_load_timeout: Duration::from_secs(30),
        }
    }
}

impl FetchOptions {
    fn validate(&self) -> Result<(), AppError> {
        if self.max_retries < 1 {
            return Err(AppError::ConfigError(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.page_load_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "page_load_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fetches a page in a real browser, captures a screenshot, and optionally
/// returns the page markup.
///
/// Owns exactly one live [`BrowserSession`] at a time. Navigation and
/// page-load-timeout failures consume a retry slot and trigger a full
/// session restart followed by a linear backoff (`2 × attempt` seconds);
/// screenshot and markup-read failures are fatal to the call and propagate
/// immediately. Generic over the session factory and the pacer so the retry
/// machinery is unit-testable with mocks.
pub struct PageFetcher<SF, P = TokioPacer>
where
    SF: SessionFactory,
    P: Pacer,
{
    factory: SF,
    session: Option<SF::Session>,
    options: FetchOptions,
    pacer: P,
}

impl<SF: SessionFactory> PageFetcher<SF, TokioPacer> {
    /// Open a fetcher, launching its browser session immediately.
    ///
    /// Fails when the options are invalid or the driver/browser cannot
    /// start — there is no degraded half-open state.
    pub async fn open(factory: SF, options: FetchOptions) -> Result<Self, AppError> {
        Self::open_with_pacer(factory, options, TokioPacer).await
    }
}

impl<SF, P> PageFetcher<SF, P>
where
    SF: SessionFactory,
    P: Pacer,
{
    /// Like [`open`](PageFetcher::open) with an injected pacer. Tests use
    /// this to record the backoff schedule instead of sleeping.
    pub async fn open_with_pacer(
        factory: SF,
        options: FetchOptions,
        pacer: P,
    ) -> Result<Self, AppError> {
        options.validate()?;
        let session = factory.open().await?;
        Ok(Self {
            factory,
            session: Some(session),
            options,
            pacer,
        })
    }

    /// Fetch `url`, capture a screenshot to `screenshot_path`, and return
    /// the page markup when `want_markup` is set.
    ///
    /// With `use_cache` enabled and a file already present at
    /// `screenshot_path`, navigation is skipped entirely. In that case the
    /// markup (if requested) is read from the session's *current* page,
    /// which never navigated to `url` during this call — it holds whatever
    /// page was last loaded. That quirk is preserved intentionally and
    /// logged as a warning; callers relying on cache hits for markup should
    /// treat the result as stale.
    pub async fn fetch(
        &mut self,
        url: &str,
        screenshot_path: &Path,
        want_markup: bool,
    ) -> Result<Option<String>, AppError> {
        if self.options.use_cache && screenshot_path.is_file() {
            tracing::info!(%url, path = %screenshot_path.display(), "Screenshot already exists, skipping navigation");
            if want_markup {
                tracing::warn!(
                    %url,
                    "Cache hit: returning markup from the session's current page, which may not be the requested URL"
                );
                return self.session()?.page_source().await.map(Some);
            }
            return Ok(None);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.attempt_fetch(url, screenshot_path, want_markup).await {
                Ok(markup) => return Ok(markup),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(%url, attempt, error = %e, "Fetch attempt failed");

                    if attempt >= self.options.max_retries {
                        tracing::error!(
                            %url,
                            max_retries = self.options.max_retries,
                            "Max retries reached"
                        );
                        return Err(e);
                    }

                    self.restart_session().await?;
                    self.pacer
                        .sleep(Duration::from_secs(2 * u64::from(attempt)))
                        .await;
                }
                Err(e) => {
                    tracing::error!(%url, error = %e, "Non-retryable fetch failure");
                    return Err(e);
                }
            }
        }
    }

    /// One navigation attempt: timeout → navigate → ready-state wait →
    /// screenshot → markup.
    async fn attempt_fetch(
        &self,
        url: &str,
        screenshot_path: &Path,
        want_markup: bool,
    ) -> Result<Option<String>, AppError> {
        let session = self.session()?;

        session.set_page_load_timeout(self.options.page_load_timeout);
        session.navigate(url).await?;
        session.wait_until_ready().await?;

        Self::save_screenshot(session, screenshot_path).await?;

        if want_markup {
            let markup = session.page_source().await.inspect_err(|e| {
                tracing::error!(%url, error = %e, "Failed to read page markup");
            })?;
            return Ok(Some(markup));
        }
        Ok(None)
    }

    async fn save_screenshot(session: &SF::Session, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Screenshot(format!("Failed to create {}: {e}", parent.display())))?;
        }

        session
            .set_window_size(SCREENSHOT_WIDTH, SCREENSHOT_HEIGHT)
            .await?;
        session.save_screenshot(path).await?;

        tracing::info!(path = %path.display(), "Screenshot saved");
        Ok(())
    }

    /// Discard the current session and open a fresh one.
    ///
    /// The old session is fully closed (errors swallowed) before the new
    /// one is acquired, so at most one browser is alive per fetcher. A
    /// failed relaunch is fatal and leaves the fetcher without a session.
    async fn restart_session(&mut self) -> Result<(), AppError> {
        if let Some(old) = self.session.take() {
            old.close().await;
        }
        tracing::info!("Restarting browser session");
        self.session = Some(self.factory.open().await?);
        Ok(())
    }

    fn session(&self) -> Result<&SF::Session, AppError> {
        self.session
            .as_ref()
            .ok_or_else(|| AppError::Browser("Session is closed".into()))
    }

    /// Tear the fetcher down, releasing the underlying browser.
    /// Best-effort: teardown failures never surface.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn always_failing() -> Vec<Result<(), AppError>> {
        // More scripted failures than any test's retry budget.
        (0..16)
            .map(|_| Err(AppError::Navigation("net::ERR_CONNECTION_RESET".into())))
            .collect()
    }

    async fn open_fetcher(
        factory: MockSessionFactory,
        options: FetchOptions,
    ) -> (PageFetcher<MockSessionFactory, RecordingPacer>, RecordingPacer) {
        let pacer = RecordingPacer::new();
        let fetcher = PageFetcher::open_with_pacer(factory, options, pacer.clone())
            .await
            .unwrap();
        (fetcher, pacer)
    }

    #[tokio::test]
    async fn always_failing_navigation_exhausts_retry_budget() {
        let factory = MockSessionFactory::with_navigation_script(always_failing());
        let options = FetchOptions {
            max_retries: 3,
            ..FetchOptions::default()
        };
        let (mut fetcher, _) = open_fetcher(factory.clone(), options).await;

        let err = fetcher
            .fetch("https://example.com", Path::new("/tmp/shot.png"), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Navigation(_)));
        // Exactly 3 attempts: initial session + 2 restarts.
        assert_eq!(factory.events().navigate_count(), 3);
        assert_eq!(factory.sessions_opened(), 3);
    }

    #[tokio::test]
    async fn backoff_schedule_is_linear_in_attempt_number() {
        let factory = MockSessionFactory::with_navigation_script(always_failing());
        let options = FetchOptions {
            max_retries: 4,
            ..FetchOptions::default()
        };
        let (mut fetcher, pacer) = open_fetcher(factory, options).await;

        let _ = fetcher
            .fetch("https://example.com", Path::new("/tmp/shot.png"), true)
            .await;

        // Waits before attempts 2, 3, 4.
        assert_eq!(
            pacer.slept(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6),
            ]
        );
    }

    #[tokio::test]
    async fn no_backoff_after_final_attempt() {
        let factory = MockSessionFactory::with_navigation_script(always_failing());
        let options = FetchOptions {
            max_retries: 1,
            ..FetchOptions::default()
        };
        let (mut fetcher, pacer) = open_fetcher(factory.clone(), options).await;

        let err = fetcher
            .fetch("https://example.com", Path::new("/tmp/shot.png"), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Navigation(_)));
        assert_eq!(factory.events().navigate_count(), 1);
        assert_eq!(factory.sessions_opened(), 1);
        assert!(pacer.slept().is_empty());
    }

    #[tokio::test]
    async fn cache_hit_skips_navigation_and_returns_current_markup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"png").unwrap();

        let factory = MockSessionFactory::new().with_page_source("<html>stale</html>");
        let options = FetchOptions {
            use_cache: true,
            ..FetchOptions::default()
        };
        let (mut fetcher, _) = open_fetcher(factory.clone(), options).await;

        let markup = fetcher
            .fetch("https://example.com", &path, true)
            .await
            .unwrap();

        assert_eq!(markup.as_deref(), Some("<html>stale</html>"));
        assert_eq!(factory.events().navigate_count(), 0);
        assert_eq!(factory.events().screenshot_count(), 0);
    }

    #[tokio::test]
    async fn cache_hit_without_markup_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"png").unwrap();

        let factory = MockSessionFactory::new();
        let options = FetchOptions {
            use_cache: true,
            ..FetchOptions::default()
        };
        let (mut fetcher, _) = open_fetcher(factory.clone(), options).await;

        let markup = fetcher
            .fetch("https://example.com", &path, false)
            .await
            .unwrap();

        assert!(markup.is_none());
        assert_eq!(factory.events().navigate_count(), 0);
        assert_eq!(factory.events().page_source_count(), 0);
    }

    #[tokio::test]
    async fn cache_miss_with_use_cache_still_navigates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");

        let factory = MockSessionFactory::new().with_page_source("<html>fresh</html>");
        let options = FetchOptions {
            use_cache: true,
            ..FetchOptions::default()
        };
        let (mut fetcher, _) = open_fetcher(factory.clone(), options).await;

        let markup = fetcher.fetch("https://example.com", &path, true).await.unwrap();

        assert_eq!(markup.as_deref(), Some("<html>fresh</html>"));
        assert_eq!(factory.events().navigate_count(), 1);
    }

    #[tokio::test]
    async fn screenshot_taken_on_fresh_session_after_navigation_failure() {
        // First navigation fails, second succeeds.
        let factory = MockSessionFactory::with_navigation_script(vec![
            Err(AppError::Navigation("renderer crashed".into())),
            Ok(()),
        ]);
        let (mut fetcher, _) = open_fetcher(factory.clone(), FetchOptions::default()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fetcher
            .fetch("https://example.com", &path, false)
            .await
            .unwrap();

        let events = factory.events();
        // Session 1 only attempted navigation; session 2 did the screenshot.
        assert_eq!(events.sessions_for(SessionOp::Navigate), vec![1, 2]);
        assert_eq!(events.sessions_for(SessionOp::Screenshot), vec![2]);
        assert_eq!(factory.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn timeout_failures_also_consume_retries() {
        let factory = MockSessionFactory::with_navigation_script(vec![
            Err(AppError::Timeout(30)),
            Err(AppError::Timeout(30)),
        ]);
        let options = FetchOptions {
            max_retries: 2,
            ..FetchOptions::default()
        };
        let (mut fetcher, _) = open_fetcher(factory.clone(), options).await;

        let err = fetcher
            .fetch("https://example.com", Path::new("/tmp/shot.png"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(30)));
        assert_eq!(factory.events().navigate_count(), 2);
    }

    #[tokio::test]
    async fn screenshot_failure_is_fatal_and_consumes_no_retry() {
        let factory = MockSessionFactory::new()
            .with_screenshot_error(AppError::Screenshot("read-only filesystem".into()));
        let options = FetchOptions {
            max_retries: 5,
            ..FetchOptions::default()
        };
        let (mut fetcher, pacer) = open_fetcher(factory.clone(), options).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let err = fetcher
            .fetch("https://example.com", &path, false)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Screenshot(_)));
        assert_eq!(factory.events().navigate_count(), 1);
        assert_eq!(factory.sessions_opened(), 1);
        assert!(pacer.slept().is_empty());
    }

    #[tokio::test]
    async fn markup_read_failure_after_navigation_is_fatal() {
        let factory = MockSessionFactory::new()
            .with_page_source_error(AppError::PageSource("session gone".into()));
        let (mut fetcher, _) = open_fetcher(factory.clone(), FetchOptions::default()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let err = fetcher
            .fetch("https://example.com", &path, true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PageSource(_)));
        assert_eq!(factory.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn want_markup_false_returns_none_on_success() {
        let factory = MockSessionFactory::new().with_page_source("<html>ignored</html>");
        let (mut fetcher, _) = open_fetcher(factory.clone(), FetchOptions::default()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let markup = fetcher
            .fetch("https://example.com", &path, false)
            .await
            .unwrap();

        assert!(markup.is_none());
        assert_eq!(factory.events().page_source_count(), 0);
    }

    #[tokio::test]
    async fn screenshot_parent_directories_are_created() {
        let factory = MockSessionFactory::new();
        let (mut fetcher, _) = open_fetcher(factory, FetchOptions::default()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/shot.png");
        fetcher
            .fetch("https://example.com", &path, false)
            .await
            .unwrap();

        assert!(path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn open_rejects_zero_max_retries() {
        let err = PageFetcher::open(
            MockSessionFactory::new(),
            FetchOptions {
                max_retries: 0,
                ..FetchOptions::default()
            },
        )
        .await
        .map(|_| ())
        .unwrap_err();

        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn open_rejects_zero_timeout() {
        let err = PageFetcher::open(
            MockSessionFactory::new(),
            FetchOptions {
                page_load_timeout: Duration::ZERO,
                ..FetchOptions::default()
            },
        )
        .await
        .map(|_| ())
        .unwrap_err();

        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn open_propagates_launch_failure() {
        let factory = MockSessionFactory::new()
            .with_open_error(AppError::Browser("no chrome binary found".into()));

        let err = PageFetcher::open(factory, FetchOptions::default())
            .await
            .map(|_| ())
            .unwrap_err();

        assert!(matches!(err, AppError::Browser(_)));
    }

    #[tokio::test]
    async fn close_releases_the_session() {
        let factory = MockSessionFactory::new();
        let (fetcher, _) = open_fetcher(factory.clone(), FetchOptions::default()).await;

        fetcher.close().await;

        assert_eq!(factory.events().sessions_for(SessionOp::Close), vec![1]);
    }
}
