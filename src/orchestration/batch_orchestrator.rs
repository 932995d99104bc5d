// Batch Orchestrator: fans items out to the vision client, bounded by K

use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use super::aggregator::assemble;
use crate::core::config::BatchConfig;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{BatchRequest, BatchResponse, ImageItem, ItemOutcome};
use crate::services::parser::parse_extraction;
use crate::services::vision::VisionClient;
use crate::utils::Metrics;

pub const EMPTY_FILE_ERROR: &str = "empty file";
pub const REQUEST_TIMEOUT_ERROR: &str = "request timed out before this image was analyzed";
const PANIC_ERROR: &str = "internal error while analyzing image";

/// Characters of unparseable model output echoed to debug logs
const RAW_PREVIEW_CHARS: usize = 200;

/// Runs one independent pipeline per item, at most `max_concurrency` at a time
pub struct BatchOrchestrator {
    client: Arc<VisionClient>,
    max_concurrency: usize,
    request_timeout: Duration,
    metrics: Option<Metrics>,
}

impl BatchOrchestrator {
    pub fn new(client: Arc<VisionClient>, config: &BatchConfig) -> Self {
        Self {
            client,
            max_concurrency: config.max_concurrency.max(1),
            request_timeout: config.request_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process a validated batch.
    ///
    /// Every item gets exactly one outcome, in submission order. Item
    /// failures stay in their item; only scheduling and assembly faults
    /// fail the batch.
    ///
    /// Dropping the returned future aborts every queued and in-flight item.
    #[instrument(skip(self, batch), fields(total_images = batch.len()))]
    pub async fn process_batch(&self, batch: BatchRequest) -> PipelineResult<BatchResponse> {
        let start_time = Instant::now();
        let total = batch.len();
        info!(
            "Processing {} images (concurrency {}, deadline {:?})",
            total, self.max_concurrency, self.request_timeout
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut filenames = Vec::with_capacity(total);
        let mut tasks = JoinSet::new();

        for item in batch.into_items() {
            filenames.push(item.filename.clone());
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let index = item.index;
                let filename = item.filename.clone();

                // Released on every exit path when the task ends or is aborted
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::SchedulingFailed(e.to_string()))?;

                let outcome = match AssertUnwindSafe(run_item(&client, item)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        error!("Item {} ({}) panicked", index, filename);
                        ItemOutcome::failure(filename, PANIC_ERROR)
                    }
                };

                Ok::<_, PipelineError>((index, outcome))
            });
        }

        let deadline = tokio::time::sleep(self.request_timeout);
        tokio::pin!(deadline);

        let mut completed: Vec<(usize, ItemOutcome)> = Vec::with_capacity(total);
        let mut timed_out = false;

        loop {
            tokio::select! {
                biased;

                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(joined) => completed.push(Self::collect(joined)?),
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            tasks.abort_all();
            // Keep items that finished in the same instant the deadline fired
            while let Some(joined) = tasks.join_next().await {
                if let Ok(Ok(pair)) = joined {
                    completed.push(pair);
                }
            }

            let finished: HashSet<usize> = completed.iter().map(|(index, _)| *index).collect();
            let unfinished: Vec<usize> = (0..total).filter(|i| !finished.contains(i)).collect();
            warn!(
                "Request deadline of {:?} reached, {} of {} items unfinished",
                self.request_timeout,
                unfinished.len(),
                total
            );

            for index in unfinished {
                let filename = filenames[index].clone();
                completed.push((index, ItemOutcome::failure(filename, REQUEST_TIMEOUT_ERROR)));
            }
        }

        let response = assemble(total, completed)?;

        if let Some(ref m) = self.metrics {
            for result in &response.results {
                m.record_item(result.is_success());
            }
            m.record_batch_processed();
        }

        info!(
            "Batch complete in {:.2}s: {} successful, {} failed",
            start_time.elapsed().as_secs_f64(),
            response.successful(),
            response.failed()
        );

        Ok(response)
    }

    fn collect(
        joined: Result<PipelineResult<(usize, ItemOutcome)>, tokio::task::JoinError>,
    ) -> PipelineResult<(usize, ItemOutcome)> {
        match joined {
            Ok(result) => result,
            Err(e) => {
                error!("Item task failed to complete: {}", e);
                Err(PipelineError::SchedulingFailed(e.to_string()))
            }
        }
    }
}

/// One item's pipeline: analyze, release the image, parse
#[instrument(skip(client, item), fields(index = item.index, filename = %item.filename))]
async fn run_item(client: &VisionClient, item: ImageItem) -> ItemOutcome {
    if item.bytes.is_empty() {
        warn!("Skipping empty file");
        return ItemOutcome::failure(item.filename, EMPTY_FILE_ERROR);
    }

    let response = client.analyze(&item).await;
    let ImageItem { filename, .. } = item;

    let raw = match response {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Vision analysis failed: {}", e);
            return ItemOutcome::failure(filename, e);
        }
    };

    match parse_extraction(&raw.text) {
        Ok(extraction) => {
            debug!(
                "Found {} products on {} screenshot",
                extraction.products.len(),
                extraction.screenshot_type
            );
            ItemOutcome::success(filename, extraction)
        }
        Err(e) => {
            let preview: String = raw.text.chars().take(RAW_PREVIEW_CHARS).collect();
            debug!(preview = %preview, "Unparseable model output");
            warn!("Failed to parse model output: {}", e);
            ItemOutcome::failure(filename, e)
        }
    }
}
