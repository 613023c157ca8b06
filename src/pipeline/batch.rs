//! Bounded-concurrency batch runner.
//!
//! Documents are independent, so each runs on the blocking pool under a
//! semaphore permit. The permit is held through the inter-call delay,
//! which paces calls to the external model per worker slot. A document's
//! deadline starts once it holds a permit.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::cancel::CancelToken;
use super::extraction::types::{
    ExtractionResult, ProcessingError, ProcessingStage, RawDocument,
};
use super::extraction::TreasuryExtractor;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchOptions {
    /// Documents processed at once.
    pub max_concurrency: usize,
    /// Pause after each document before its slot is reused.
    pub inter_call_delay_ms: u64,
    /// Per-document deadline for the model call, counted from when the
    /// document gets a worker slot.
    pub document_timeout_ms: Option<u64>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            inter_call_delay_ms: 0,
            document_timeout_ms: None,
        }
    }
}

pub struct BatchRunner {
    extractor: Arc<TreasuryExtractor>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(extractor: Arc<TreasuryExtractor>, options: BatchOptions) -> Self {
        Self { extractor, options }
    }

    /// Process all documents. Results come back in input order, one per
    /// document; a failed worker yields an empty result with the failure
    /// recorded.
    pub async fn run(
        &self,
        documents: Vec<RawDocument>,
        cancel: Option<CancelToken>,
    ) -> Vec<ExtractionResult> {
        let total = documents.len();
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let delay = Duration::from_millis(self.options.inter_call_delay_ms);
        let timeout = self.options.document_timeout_ms.map(Duration::from_millis);

        tracing::info!(
            documents = total,
            concurrency = self.options.max_concurrency,
            "Starting batch extraction"
        );

        let mut handles = Vec::with_capacity(total);
        for doc in documents {
            let placeholder = ExtractionResult::empty(&doc);
            let semaphore = Arc::clone(&semaphore);
            let extractor = Arc::clone(&self.extractor);
            let parent = cancel.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                let token = document_token(parent, timeout);
                let result = tokio::task::spawn_blocking(move || {
                    extractor.extract_document(&doc, token.as_ref())
                })
                .await
                .ok();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            });
            handles.push((placeholder, handle));
        }

        let mut results = Vec::with_capacity(total);
        for (mut placeholder, handle) in handles {
            match handle.await {
                Ok(Some(result)) => results.push(result),
                Ok(None) | Err(_) => {
                    tracing::error!(
                        document = %placeholder.document_id,
                        "Extraction worker failed"
                    );
                    placeholder.errors.push(ProcessingError::new(
                        ProcessingStage::Parse,
                        "extraction worker failed",
                    ));
                    results.push(placeholder);
                }
            }
        }

        let transactions: usize = results.iter().map(|r| r.transactions.len()).sum();
        tracing::info!(documents = total, transactions, "Batch extraction complete");
        results
    }
}

/// Cancel token for one document, created when its work starts.
fn document_token(parent: Option<CancelToken>, timeout: Option<Duration>) -> Option<CancelToken> {
    match (parent, timeout) {
        (Some(parent), Some(t)) => Some(parent.child_with_timeout(t)),
        (None, Some(t)) => Some(CancelToken::with_timeout(t)),
        (parent, None) => parent,
    }
}
