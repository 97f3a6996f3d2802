//! Background variant generation.
//!
//! Accepted uploads are handed to a fixed pool of worker tasks through an
//! unbounded channel, so enqueueing never blocks the request path and at most
//! `variant_workers` images are resized at once. Each worker moves the upload
//! entry to Succeeded or Failed when its job finishes.
//!
//! Workers stop when the cancellation token fires or when the queue has been
//! closed and drained. A job that has started always runs to completion. Jobs
//! still queued at cancellation are not run: their entries are marked Failed
//! and their spooled files removed, so no upload is left in Processing.

use crate::imaging::ImageBackend;
use crate::processor::ImageProcessor;
use crate::upload_state::{UploadState, UploadStateStore};
use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::*;
use uuid::Uuid;

/// One image waiting for its variants.
#[derive(Debug)]
pub struct VariantJob {
    pub token: String,
    pub image_id: Uuid,
    /// Spooled upload. Deleted when the job is dropped.
    pub source: NamedTempFile,
}

#[derive(Error, Debug)]
#[error("variant queue is closed")]
pub struct QueueClosed(pub VariantJob);

pub struct VariantQueue {
    sender: Sender<VariantJob>,
    receiver: Receiver<VariantJob>,
    uploads: Arc<UploadStateStore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl VariantQueue {
    /// Spawn `workers` worker tasks on the current runtime.
    pub fn start<B: ImageBackend + 'static>(
        processor: Arc<ImageProcessor<B>>,
        uploads: Arc<UploadStateStore>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = async_channel::unbounded();
        let handles = (0..workers.max(1))
            .map(|n| {
                tokio::spawn(
                    run_worker(
                        processor.clone(),
                        uploads.clone(),
                        receiver.clone(),
                        cancel.clone(),
                    )
                    .instrument(info_span!("variant_worker", n)),
                )
            })
            .collect();
        Self {
            sender,
            receiver,
            uploads,
            workers: Mutex::new(handles),
        }
    }

    pub fn enqueue(&self, job: VariantJob) -> Result<(), QueueClosed> {
        self.sender.try_send(job).map_err(|e| QueueClosed(e.into_inner()))
    }

    /// Jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Stop accepting jobs, let workers drain what is queued, and wait for them.
    ///
    /// Jobs still queued once every worker has stopped (after cancellation)
    /// are abandoned.
    pub async fn shutdown(&self) {
        self.sender.close();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "variant worker panicked");
            }
        }
        let abandoned = abandon_pending(&self.receiver, &self.uploads);
        if abandoned > 0 {
            warn!(abandoned, "variant queue shut down with jobs left");
        }
    }
}

async fn run_worker<B: ImageBackend + 'static>(
    processor: Arc<ImageProcessor<B>>,
    uploads: Arc<UploadStateStore>,
    receiver: Receiver<VariantJob>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Worker cancelled");
                abandon_pending(&receiver, &uploads);
                break;
            },
            job = receiver.recv() => {
                match job {
                    // Closed and empty.
                    Err(_) => break,
                    Ok(job) => process(processor.clone(), &uploads, job).await,
                }
            }
        }
    }
    info!("Worker stopped.");
}

/// Fail every job still waiting in the queue. Returns how many were dropped.
fn abandon_pending(receiver: &Receiver<VariantJob>, uploads: &UploadStateStore) -> usize {
    let mut abandoned = 0;
    while let Ok(job) = receiver.try_recv() {
        warn!(token = %job.token, image_id = %job.image_id, "variant job abandoned at shutdown");
        if let Err(err) = uploads.update(&job.token, UploadState::Failed, None) {
            debug!(token = %job.token, error = %err, "upload state not updated");
        }
        abandoned += 1;
    }
    abandoned
}

#[instrument(skip_all, fields(token = %job.token, image_id = %job.image_id))]
async fn process<B: ImageBackend + 'static>(
    processor: Arc<ImageProcessor<B>>,
    uploads: &UploadStateStore,
    job: VariantJob,
) {
    let token = job.token.clone();
    let image_id = job.image_id;
    let result = tokio::task::spawn_blocking(move || {
        let result = processor.generate_variants(job.image_id, job.source.path());
        drop(job.source);
        result
    })
    .await;

    let state = match result {
        Ok(Ok(report)) => {
            debug!(widths = ?report.generated_widths(), "variants ready");
            UploadState::Succeeded
        }
        Ok(Err(err)) => {
            error!(error = %err, "variant generation failed");
            UploadState::Failed
        }
        Err(err) => {
            error!(error = %err, "variant task panicked");
            UploadState::Failed
        }
    };
    if let Err(err) = uploads.update(&token, state, Some(image_id)) {
        // The token may have been swept while the job ran.
        debug!(error = %err, %state, "upload state not updated");
    }
}
