use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;

use scout_core::error::AppError;
use scout_core::traits::{BrowserSession, SessionFactory};

/// Request headers the crawler advertises.
///
/// Advisory metadata only: CDP drives a real browser, which sends its own
/// headers, so these are declared for callers that mirror requests through
/// plain HTTP clients rather than enforced on the driver.
pub const ADVISORY_HEADERS: [(&str, &str); 5] = [
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
    ),
    ("Accept-Encoding", "gzip, deflate"),
    ("Accept-Language", "*"),
    ("Connection", "keep-alive"),
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/86.0.42400.198 Safari/537.36",
    ),
];

/// How often the ready-state poll re-checks `document.readyState`.
const READY_STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches headless Chromium sessions over the Chrome DevTools Protocol.
///
/// The launch configuration is fixed: headless, sandboxing disabled, GPU
/// and shared-memory usage disabled, 1920×1080 window, popups /
/// notifications / extensions disabled, certificate errors ignored, and
/// automation-detection flags suppressed.
#[derive(Clone, Default)]
pub struct ChromiumSessionFactory {
    chrome_binary: Option<PathBuf>,
}

impl ChromiumSessionFactory {
    /// Factory that locates the Chrome binary via `SCOUT_CHROME_BIN` or
    /// well-known install paths, falling back to chromiumoxide's own lookup.
    pub fn new() -> Self {
        Self {
            chrome_binary: find_chrome_binary(),
        }
    }

    /// Factory pinned to an explicit Chrome/Chromium binary.
    pub fn with_chrome_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            chrome_binary: Some(binary.into()),
        }
    }

    fn build_config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox();

        if let Some(bin) = &self.chrome_binary {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder
            .arg("--headless=new")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080")
            .arg("--disable-notifications")
            .arg("--disable-infobars")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--ignore-certificate-errors")
            .arg("--disable-blink-features=AutomationControlled")
            .build()
            .map_err(|e| AppError::Browser(format!("Browser config error: {e}")))
    }
}

impl SessionFactory for ChromiumSessionFactory {
    type Session = ChromiumSession;

    async fn open(&self) -> Result<ChromiumSession, AppError> {
        let config = self.build_config()?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(AppError::Browser(format!("Failed to open page: {e}")));
            }
        };

        Ok(ChromiumSession {
            browser,
            page,
            handler_task,
            page_load_timeout: Mutex::new(Duration::from_secs(30)),
        })
    }
}

/// One live Chromium instance with a single page, driven over CDP.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    page_load_timeout: Mutex<Duration>,
}

impl ChromiumSession {
    fn timeout(&self) -> Duration {
        *self
            .page_load_timeout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BrowserSession for ChromiumSession {
    fn set_page_load_timeout(&self, timeout: Duration) {
        *self
            .page_load_timeout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = timeout;
    }

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let timeout = self.timeout();
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::Navigation(format!(
                "Failed to navigate to {url}: {e}"
            ))),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn wait_until_ready(&self) -> Result<(), AppError> {
        let timeout = self.timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let state: String = self
                .page
                .evaluate("document.readyState")
                .await
                .map_err(|e| AppError::Navigation(format!("Failed to read ready state: {e}")))?
                .into_value()
                .map_err(|e| AppError::Navigation(format!("Unexpected ready state value: {e}")))?;

            if state == "complete" {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::Timeout(timeout.as_secs()));
            }
            tokio::time::sleep(READY_STATE_POLL_INTERVAL).await;
        }
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), AppError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| AppError::Screenshot(format!("Invalid viewport params: {e}")))?;

        self.page
            .execute(params)
            .await
            .map_err(|e| AppError::Screenshot(format!("Failed to set viewport: {e}")))?;
        Ok(())
    }

    async fn save_screenshot(&self, path: &Path) -> Result<(), AppError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();

        self.page.save_screenshot(params, path).await.map_err(|e| {
            AppError::Screenshot(format!(
                "Failed to save screenshot to {}: {e}",
                path.display()
            ))
        })?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::PageSource(format!("Failed to read page content: {e}")))
    }

    async fn close(mut self) {
        // Best-effort teardown; a wedged browser must not surface errors here.
        if let Err(e) = self.page.close().await {
            tracing::debug!("Failed to close page: {e}");
        }
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser did not exit cleanly: {e}");
        }
        self.handler_task.abort();
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// Honours an explicit `SCOUT_CHROME_BIN` override first, then well-known
/// system paths. Returns `None` to let chromiumoxide do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("SCOUT_CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("SCOUT_CHROME_BIN set but {} does not exist", path.display());
    }

    let candidates: &[&str] = &[
        // Snap (Ubuntu default) — the /snap/bin wrapper strips CLI flags
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_headers_cover_the_declared_set() {
        let names: Vec<&str> = ADVISORY_HEADERS.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "Accept",
                "Accept-Encoding",
                "Accept-Language",
                "Connection",
                "User-Agent"
            ]
        );
        let (_, ua) = ADVISORY_HEADERS[4];
        assert!(ua.contains("Mozilla/5.0"));
    }

    #[test]
    fn factory_config_builds_without_a_binary_override() {
        let factory = ChromiumSessionFactory::default();
        assert!(factory.build_config().is_ok());
    }
}
