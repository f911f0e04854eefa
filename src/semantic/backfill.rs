//! Bulk generation of missing embeddings.
//!
//! The coordinator snapshots the records lacking an embedding, embeds them in
//! fixed-size batches and attaches each vector only if its record still has
//! the text the vector was computed from. A failed batch is logged and
//! skipped; the run continues with the next one. Running it again picks up
//! whatever is still missing, so repeated runs converge.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::semantic::BoundedEncoder;
use crate::storage::{EmbeddingStore, PutOutcome, StoreError};
use crate::types::{PendingEmbedding, RecordId};

/// Outcome of one backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Records lacking an embedding when the run started
    pub total_missing: usize,
    /// Embeddings attached by this run
    pub generated: usize,
    pub failed_batches: usize,
    /// Records whose batch failed
    pub failed_ids: Vec<RecordId>,
    /// Records whose text changed while their batch was being embedded
    pub stale_skipped: usize,
    /// Records deleted while their batch was being embedded
    pub vanished_skipped: usize,
}

impl BackfillReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0 && self.stale_skipped == 0
    }
}

/// Progress after each finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based index of the batch just finished
    pub batch: usize,
    pub batch_count: usize,
    /// Records handled so far, successful or not
    pub processed: usize,
    pub total: usize,
    pub generated: usize,
}

/// Drives embedding generation for records without a current embedding.
#[derive(Debug, Clone)]
pub struct BackfillCoordinator {
    store: Arc<EmbeddingStore>,
    encoder: BoundedEncoder,
}

impl BackfillCoordinator {
    pub fn new(store: Arc<EmbeddingStore>, encoder: BoundedEncoder) -> Self {
        Self { store, encoder }
    }

    /// Generate embeddings for every record lacking one.
    ///
    /// `batch_size` of 0 is treated as 1.
    pub async fn run_backfill(&self, batch_size: usize) -> BackfillReport {
        self.run_with_progress(batch_size, |_| {}).await
    }

    /// Like [`Self::run_backfill`], calling `on_batch` after every batch.
    pub async fn run_with_progress<F>(&self, batch_size: usize, mut on_batch: F) -> BackfillReport
    where
        F: FnMut(&BatchProgress),
    {
        let pending = self.store.all_missing_embeddings();
        let mut report = BackfillReport {
            total_missing: pending.len(),
            ..BackfillReport::default()
        };

        if pending.is_empty() {
            info!("no records need embedding generation");
            return report;
        }

        let batch_size = batch_size.max(1);
        let batch_count = pending.len().div_ceil(batch_size);
        info!(
            total = pending.len(),
            batch_size, batch_count, "starting embedding backfill"
        );

        let mut processed = 0;
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            debug!(batch = index + 1, batch_count, "processing batch");
            self.process_batch(batch, &mut report).await;

            processed += batch.len();
            on_batch(&BatchProgress {
                batch: index + 1,
                batch_count,
                processed,
                total: pending.len(),
                generated: report.generated,
            });
        }

        info!(
            generated = report.generated,
            failed_batches = report.failed_batches,
            stale = report.stale_skipped,
            vanished = report.vanished_skipped,
            "embedding backfill finished"
        );
        report
    }

    async fn process_batch(&self, batch: &[PendingEmbedding], report: &mut BackfillReport) {
        let texts = batch.iter().map(|p| p.text.clone()).collect();

        let embeddings = match self.encoder.embed_batch(texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                let ids: Vec<&str> = batch.iter().map(|p| p.id.as_str()).collect();
                error!(error = %e, ?ids, "embedding batch failed");
                report.failed_batches += 1;
                report.failed_ids.extend(batch.iter().map(|p| p.id.clone()));
                return;
            }
        };

        for (item, vector) in batch.iter().zip(embeddings) {
            match self.store.put_if_current(&item.id, &vector, &item.source) {
                Ok(PutOutcome::Attached) => report.generated += 1,
                Ok(PutOutcome::Stale) => report.stale_skipped += 1,
                Err(StoreError::RecordNotFound { .. }) => {
                    debug!(id = %item.id, "record deleted during backfill");
                    report.vanished_skipped += 1;
                }
                Err(e) => {
                    warn!(id = %item.id, error = %e, "could not store embedding");
                    report.failed_ids.push(item.id.clone());
                }
            }
        }
    }
}
