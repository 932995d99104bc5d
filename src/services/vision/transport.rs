use async_trait::async_trait;

use crate::core::errors::ProviderResult;

/// One image ready to be sent to the vision service
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub filename: String,
    /// `data:<mime>;base64,...`
    pub data_url: String,
}

/// Model-generated text returned for one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub text: String,
}

impl RawResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A single call to a vision-capable model.
///
/// Implementations classify failures as `ProviderError::Transient` or
/// `ProviderError::Fatal` and never retry on their own.
#[async_trait]
pub trait VisionTransport: Send + Sync {
    async fn send(&self, request: &VisionRequest) -> ProviderResult<RawResponse>;

    fn name(&self) -> &str {
        "vision"
    }
}
