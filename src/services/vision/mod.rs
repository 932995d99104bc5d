// Vision client adapter: one image in, raw model text out

pub mod api_client;
pub mod backoff;
pub mod openai;
pub mod prompt;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use api_client::VisionClient;
pub use backoff::{Backoff, RetryPolicy};
pub use openai::OpenAiTransport;
pub use transport::{RawResponse, VisionRequest, VisionTransport};
