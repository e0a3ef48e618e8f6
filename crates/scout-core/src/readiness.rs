use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::traits::{ModelServer, Pacer};

/// Polling budget for the model server's readiness probe.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Total probe attempts before giving up.
    pub max_probes: u32,
    /// Wait between probe attempts.
    pub probe_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_probes: 30,
            probe_interval: Duration::from_secs(1),
        }
    }
}

/// Shared "model pulled" state for one model-serving endpoint.
///
/// Pulling a model is expensive, so [`ensure`](Self::ensure) runs the
/// probe-then-pull sequence at most once per `ModelReadiness` value; clones
/// share the flag. Callers that want the once-per-process behavior hold one
/// instance and pass clones to every classifier they construct. The flag is
/// guarded by an async mutex held across the whole sequence, so concurrent
/// constructions serialize instead of racing to duplicate pulls.
#[derive(Debug, Clone, Default)]
pub struct ModelReadiness {
    ready: Arc<Mutex<bool>>,
}

impl ModelReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the server to come up, then pull `model` — once.
    ///
    /// The probe treats any HTTP response as "server up"; only
    /// connection-level failures are retried, up to
    /// [`ReadinessConfig::max_probes`] attempts. Exhausting the budget is an
    /// [`AppError::InitError`] and no pull is issued. A failed pull
    /// propagates with the flag left unset, so a later call retries the
    /// whole sequence.
    pub async fn ensure<M, P>(
        &self,
        server: &M,
        model: &str,
        config: &ReadinessConfig,
        pacer: &P,
    ) -> Result<(), AppError>
    where
        M: ModelServer,
        P: Pacer,
    {
        let mut ready = self.ready.lock().await;
        if *ready {
            tracing::info!(%model, "Model already initialized");
            return Ok(());
        }

        self.wait_for_server(server, config, pacer).await?;

        tracing::info!(%model, "Pulling model...");
        server.pull_model(model).await.inspect_err(|e| {
            tracing::error!(%model, error = %e, "Failed to pull model");
        })?;

        *ready = true;
        tracing::info!(%model, "Model initialized");
        Ok(())
    }

    async fn wait_for_server<M, P>(
        &self,
        server: &M,
        config: &ReadinessConfig,
        pacer: &P,
    ) -> Result<(), AppError>
    where
        M: ModelServer,
        P: Pacer,
    {
        for attempt in 1..=config.max_probes {
            match server.probe_version().await {
                Ok(()) => return Ok(()),
                Err(AppError::NetworkError(cause)) => {
                    tracing::debug!(attempt, %cause, "Model server not reachable yet");
                    if attempt < config.max_probes {
                        pacer.sleep(config.probe_interval).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::InitError(format!(
            "Model server unreachable after {} probes",
            config.max_probes
        )))
    }
}
