// Scriptable in-memory transport for pipeline tests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::transport::{RawResponse, VisionRequest, VisionTransport};
use crate::core::errors::{ProviderError, ProviderResult};
use crate::core::types::ImageItem;

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

/// What the fake does for one call
#[derive(Debug, Clone)]
pub enum Step {
    Ok(String),
    Transient,
    Fatal,
    Delay(Duration, String),
}

pub struct FakeTransport {
    script: Mutex<VecDeque<Step>>,
    per_file: HashMap<String, Step>,
    fallback: Step,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<VisionRequest>>,
}

impl FakeTransport {
    fn build(script: Vec<Step>, per_file: HashMap<String, Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            per_file,
            fallback,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::build(Vec::new(), HashMap::new(), step)
    }

    /// Steps in call order, then transient failures
    pub fn scripted(steps: Vec<Step>) -> Self {
        Self::build(steps, HashMap::new(), Step::Transient)
    }

    pub fn by_filename(steps: Vec<(&str, Step)>, fallback: Step) -> Self {
        let per_file = steps
            .into_iter()
            .map(|(name, step)| (name.to_string(), step))
            .collect();
        Self::build(Vec::new(), per_file, fallback)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<VisionRequest> {
        self.requests.lock().clone()
    }

    fn next_step(&self, filename: &str) -> Step {
        if let Some(step) = self.per_file.get(filename) {
            return step.clone();
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VisionTransport for FakeTransport {
    async fn send(&self, request: &VisionRequest) -> ProviderResult<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let step = self.next_step(&request.filename);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match step {
            Step::Ok(text) => Ok(RawResponse::new(text)),
            Step::Transient => Err(ProviderError::transient("HTTP 503: overloaded")),
            Step::Fatal => Err(ProviderError::Fatal("HTTP 401: invalid api key".into())),
            Step::Delay(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(RawResponse::new(text))
            }
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn png_item(index: usize, filename: &str) -> ImageItem {
    ImageItem {
        index,
        filename: filename.to_string(),
        bytes: Bytes::from_static(PNG_BYTES),
        mime_type: "image/png".to_string(),
    }
}
