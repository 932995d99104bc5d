// OpenAI Responses API transport for screenshot extraction

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::prompt::{extraction_format, SYSTEM_PROMPT, USER_PROMPT};
use super::transport::{RawResponse, VisionRequest, VisionTransport};
use crate::core::config::VisionConfig;
use crate::core::errors::{ProviderError, ProviderResult};

/// Longest provider error body kept in an item error message
const ERROR_BODY_LIMIT: usize = 300;

/// Vision transport backed by the OpenAI Responses API
pub struct OpenAiTransport {
    http_client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    image_detail: String,
}

impl OpenAiTransport {
    /// The key is passed in explicitly; the transport never reads the environment.
    pub fn new(api_key: impl Into<String>, config: &VisionConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            endpoint: format!("{}/responses", config.base_url),
            model: config.model.clone(),
            image_detail: config.image_detail.clone(),
        })
    }

    fn build_body(&self, request: &VisionRequest) -> Value {
        json!({
            "model": self.model,
            "input": [
                {
                    "role": "system",
                    "content": [{ "type": "input_text", "text": SYSTEM_PROMPT }]
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "input_text", "text": USER_PROMPT },
                        {
                            "type": "input_image",
                            "image_url": request.data_url,
                            "detail": self.image_detail
                        }
                    ]
                }
            ],
            "text": { "format": extraction_format() }
        })
    }
}

#[async_trait]
impl VisionTransport for OpenAiTransport {
    async fn send(&self, request: &VisionRequest) -> ProviderResult<RawResponse> {
        debug!("Sending {} to {}", request.filename, self.model);

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transient(format!("failed to read response body: {}", e)))?;

        let envelope: Value = serde_json::from_str(&body).map_err(|e| {
            ProviderError::Fatal(format!("malformed response envelope: {}", e))
        })?;

        extract_output_text(&envelope).map(RawResponse::new)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn classify_request_error(err: reqwest::Error) -> ProviderError {
    if err.is_builder() {
        return ProviderError::Fatal(format!("invalid request: {}", err));
    }
    if err.is_timeout() {
        return ProviderError::transient("request timed out");
    }
    if err.is_connect() {
        return ProviderError::transient(format!("connection failed: {}", err));
    }
    ProviderError::transient(format!("request failed: {}", err))
}

/// 408, 409, 429 and 5xx are worth retrying; everything else is final
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let reason = format!("HTTP {}: {}", status.as_u16(), error_message(body));

    let retryable = status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS
        );

    if retryable {
        ProviderError::Transient { reason, retry_after }
    } else {
        ProviderError::Fatal(reason)
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Prefer the provider's `error.message`, fall back to a truncated body
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value["error"]["message"].as_str() {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(ERROR_BODY_LIMIT).collect()
}

/// Concatenate every `output_text` part of a Responses API envelope
pub(crate) fn extract_output_text(envelope: &Value) -> ProviderResult<String> {
    if let Some(text) = envelope["output_text"].as_str() {
        return Ok(text.to_string());
    }

    let mut text = String::new();
    let mut refusal = None;

    let parts = envelope["output"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["content"].as_array())
        .flatten();

    for part in parts {
        match part["type"].as_str() {
            Some("output_text") => {
                if let Some(chunk) = part["text"].as_str() {
                    text.push_str(chunk);
                }
            }
            Some("refusal") => {
                refusal = part["refusal"].as_str().map(str::to_string);
            }
            _ => {}
        }
    }

    match refusal {
        Some(reason) if text.is_empty() => Err(ProviderError::Fatal(format!(
            "vision model refused the request: {}",
            reason
        ))),
        _ => Ok(text),
    }
}
