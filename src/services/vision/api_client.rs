use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::backoff::RetryPolicy;
use super::openai::OpenAiTransport;
use super::transport::{RawResponse, VisionRequest, VisionTransport};
use crate::core::config::Config;
use crate::core::errors::{ProviderError, ProviderResult};
use crate::core::types::ImageItem;
use crate::utils::image_ops::encode_data_url;
use crate::utils::Metrics;

/// Vision client with per-call timeout and bounded retries.
///
/// Holds no mutable state, so one instance serves every item pipeline
/// concurrently and one item's failures never affect another's budget.
pub struct VisionClient {
    transport: Arc<dyn VisionTransport>,
    retry: RetryPolicy,
    call_timeout: Duration,
    metrics: Option<Metrics>,
}

impl VisionClient {
    pub fn new(transport: Arc<dyn VisionTransport>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            transport,
            retry,
            call_timeout,
            metrics: None,
        }
    }

    /// Retry budget and call timeout taken from configuration
    pub fn from_config(transport: Arc<dyn VisionTransport>, config: &Config) -> Self {
        Self::new(transport, RetryPolicy::from(&config.retry), config.vision.call_timeout)
    }

    /// Production client talking to OpenAI with the given key
    pub fn openai(config: &Config, api_key: &str, metrics: Option<Metrics>) -> Result<Self> {
        let transport = Arc::new(OpenAiTransport::new(api_key, &config.vision)?);
        let mut client = Self::from_config(transport, config);

        if let Some(metrics) = metrics {
            client = client.with_metrics(metrics);
        }

        Ok(client)
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send one image to the vision service.
    ///
    /// Transient failures are retried with backoff up to the attempt budget,
    /// then surface as `ProviderError::Exhausted`. Fatal failures return
    /// immediately.
    #[instrument(skip(self, item), fields(index = item.index, transport = self.transport.name()))]
    pub async fn analyze(&self, item: &ImageItem) -> ProviderResult<RawResponse> {
        let request = VisionRequest {
            filename: item.filename.clone(),
            data_url: encode_data_url(&item.bytes, &item.mime_type),
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            let result = match tokio::time::timeout(self.call_timeout, self.transport.send(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::transient(format!(
                    "call timed out after {:?}",
                    self.call_timeout
                ))),
            };

            if let Some(ref m) = self.metrics {
                m.record_api_call(result.is_ok(), start.elapsed());
            }

            match result {
                Ok(response) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(response);
                }
                Err(ProviderError::Transient { reason, retry_after }) => {
                    if attempt >= max_attempts {
                        warn!("Giving up after {} attempts: {}", attempt, reason);
                        return Err(ProviderError::Exhausted {
                            attempts: attempt,
                            last: reason,
                        });
                    }

                    let delay = backoff.next_delay(retry_after);
                    debug!(
                        "Transient failure: {}. Retrying in {}ms ({}/{})",
                        reason,
                        delay.as_millis(),
                        attempt,
                        max_attempts
                    );
                    if let Some(ref m) = self.metrics {
                        m.record_retry();
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("Non-retryable vision failure: {}", e);
                    return Err(e);
                }
            }
        }
    }
}
