use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use scout_core::error::AppError;
use scout_core::readiness::{ModelReadiness, ReadinessConfig};
use scout_core::traits::{Classifier, ModelServer, TokioPacer};

const DEFAULT_BASE_URL: &str = "http://ollama-app:11434";
const DEFAULT_MODEL: &str = "llama3";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for an [`OllamaClassifier`].
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub http_timeout: Duration,
    pub readiness: ReadinessConfig,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            readiness: ReadinessConfig::default(),
        }
    }
}

impl OllamaConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }
}

/// Classification client for an Ollama-compatible model-serving endpoint.
///
/// Construction blocks until the server answers its version endpoint and
/// the configured model has been pulled — guarded by the injected
/// [`ModelReadiness`] so the expensive pull runs at most once per shared
/// readiness handle, no matter how many clients are built.
#[derive(Clone)]
pub struct OllamaClassifier {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaClassifier {
    /// Build the HTTP client and run the readiness/pull sequence.
    ///
    /// Fails with no partial client when the server never becomes
    /// reachable within the readiness budget or the model pull fails.
    pub async fn connect(
        config: OllamaConfig,
        readiness: &ModelReadiness,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        let classifier = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            timeout_secs: config.http_timeout.as_secs(),
        };

        readiness
            .ensure(
                &classifier,
                &classifier.model,
                &config.readiness,
                &TokioPacer,
            )
            .await?;

        Ok(classifier)
    }

    /// The model name this client sends with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

// ---- Ollama API types ----

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

impl ModelServer for OllamaClassifier {
    /// Readiness probe: any HTTP response means the server is up; only
    /// connection-level failures count as "not ready yet".
    async fn probe_version(&self) -> Result<(), AppError> {
        self.client
            .get(self.endpoint("/api/version"))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| self.transport_error(e))
    }

    async fn pull_model(&self, name: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.endpoint("/api/pull"))
            .json(&PullRequest { name })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("Model pull failed: {body}"),
                status_code: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl Classifier for OllamaClassifier {
    /// Send one non-streaming chat completion with a single user message
    /// `"{task}: {input_data}"` and return the response text verbatim.
    ///
    /// No retry and no per-call timeout override; transport and server
    /// errors propagate to the caller untranslated.
    async fn categorize(&self, task: &str, input_data: &str) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("{task}: {input_data}"),
            }],
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: body,
                status_code: status.as_u16(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse chat response: {e}")))?;

        Ok(chat.message.content)
    }
}
