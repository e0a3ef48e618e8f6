use thiserror::Error;

/// Application-wide error types for Scout.
#[derive(Error, Debug)]
pub enum AppError {
    /// Browser navigation failed (bad URL, driver lost the page, renderer crash).
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// Page load exceeded the configured timeout.
    #[error("Page load timed out after {0} seconds")]
    Timeout(u64),

    /// Screenshot capture or screenshot I/O failed after a successful navigation.
    #[error("Screenshot error: {0}")]
    Screenshot(String),

    /// Reading the page markup failed after a successful navigation.
    #[error("Page source error: {0}")]
    PageSource(String),

    /// The browser/driver could not be launched or configured.
    #[error("Browser error: {0}")]
    Browser(String),

    /// Connection-level network failure (refused, unreachable, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP request failed for a non-connection reason.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Model-serving API returned an error response.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError { message: String, status_code: u16 },

    /// Model server never became ready; aborts client construction.
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// For the fetch loop this means navigation and page-load-timeout
    /// failures; for the readiness poll it means connection-level failures.
    /// Everything else is fatal to the operation that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Navigation(_) | AppError::Timeout(_) | AppError::NetworkError(_)
        )
    }
}
