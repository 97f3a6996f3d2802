//! Upload ingestion.
//!
//! [`IngestionOrchestrator::create`] is the single entry point for a new thread
//! with an image. In order:
//!
//! 1. **Gate**: an unknown token is rejected; a token that already left
//!    `Created` is redirected to the thread it produced.
//! 2. **Validate**: subject/body length and declared size, before any I/O.
//! 3. **Claim**: atomic `Created → Processing`. Of two racing submissions
//!    with the same token exactly one gets past this point.
//! 4. **Spool**: copy the stream to a temp file, capped at the byte ceiling,
//!    and release the caller's reader.
//! 5. **Original**: sniff, decode and store the original; the image UUID
//!    exists before this function returns.
//! 6. **Variants**: queue background generation; not awaited.
//! 7. **Thread**: create the thread record and remember its id on the entry.
//!
//! Any failure after the claim marks the entry `Failed`, so a retry with the
//! same token is answered from the entry instead of processing again.

use crate::config::{AppConfig, UploadsConfig};
use crate::imaging::{ImageBackend, RustBackend};
use crate::processor::{ImageProcessor, ProcessError};
use crate::threads::{NewThread, RepositoryError, ThreadId, ThreadRepository};
use crate::upload_state::{Claim, UploadEntry, UploadState, UploadStateStore};
use crate::workers::{VariantJob, VariantQueue};
use serde::Serialize;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no file uploaded")]
    MissingFile,
    #[error("upload exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("subject longer than {limit} characters")]
    SubjectTooLong { limit: usize },
    #[error("body longer than {limit} characters")]
    BodyTooLong { limit: usize },
    #[error("unknown upload token")]
    UnknownToken,
    #[error("upload token already used")]
    StaleToken,
    #[error("upload for this token is still being processed")]
    InProgress { image_id: Option<Uuid> },
    #[error("invalid image: {0}")]
    InvalidImage(#[source] ProcessError),
    #[error("temporary file error: {0}")]
    TempFile(#[source] std::io::Error),
    #[error("could not store original: {0}")]
    SaveOriginal(#[source] ProcessError),
    #[error("background task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("variant queue is closed")]
    QueueClosed,
    #[error("thread store error: {0}")]
    Repository(#[from] RepositoryError),
}

impl IngestError {
    /// Errors caused by the submission itself. Everything else is a server
    /// error and may be retried with a new token.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::MissingFile
                | IngestError::TooLarge { .. }
                | IngestError::SubjectTooLong { .. }
                | IngestError::BodyTooLong { .. }
                | IngestError::UnknownToken
                | IngestError::StaleToken
                | IngestError::InProgress { .. }
                | IngestError::InvalidImage(_)
        )
    }
}

/// The uploaded file as received from the transport layer.
pub struct Upload<R> {
    /// Client-supplied name. Logged only; the format comes from the content.
    pub file_name: String,
    pub declared_size: Option<u64>,
    pub reader: R,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadSubmission {
    pub subject: String,
    pub body: String,
    pub board_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// This submission stored a new image and created its thread.
    Created { thread_id: ThreadId, image_id: Uuid },
    /// The token was already used; this is the thread it produced.
    Existing { thread_id: ThreadId },
}

impl Outcome {
    pub fn thread_id(&self) -> ThreadId {
        match self {
            Outcome::Created { thread_id, .. } | Outcome::Existing { thread_id } => *thread_id,
        }
    }
}

pub struct IngestionOrchestrator<B: ImageBackend + 'static = RustBackend> {
    processor: Arc<ImageProcessor<B>>,
    uploads: Arc<UploadStateStore>,
    threads: Arc<dyn ThreadRepository>,
    queue: VariantQueue,
    limits: UploadsConfig,
}

impl<B: ImageBackend + 'static> IngestionOrchestrator<B> {
    /// Build an orchestrator and start its variant workers on the current runtime.
    pub fn start(
        config: &AppConfig,
        processor: Arc<ImageProcessor<B>>,
        uploads: Arc<UploadStateStore>,
        threads: Arc<dyn ThreadRepository>,
        cancel: CancellationToken,
    ) -> Self {
        let queue = VariantQueue::start(
            processor.clone(),
            uploads.clone(),
            config.processing.variant_workers,
            cancel,
        );
        Self {
            processor,
            uploads,
            threads,
            queue,
            limits: config.uploads.clone(),
        }
    }

    pub fn uploads(&self) -> &Arc<UploadStateStore> {
        &self.uploads
    }

    /// Close the variant queue and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    pub async fn create<R>(
        &self,
        token: &str,
        upload: Option<Upload<R>>,
        submission: ThreadSubmission,
    ) -> Result<Outcome, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self.uploads.get(token) {
            None => return Err(IngestError::UnknownToken),
            Some(entry) if entry.state != UploadState::Created => {
                return self.resolve_existing(entry).await;
            }
            Some(_) => {}
        }

        let upload = self.validate(upload, &submission)?;

        match self.uploads.claim(token) {
            Claim::Admitted => {}
            Claim::Unknown => return Err(IngestError::UnknownToken),
            Claim::AlreadyStarted(entry) => return self.resolve_existing(entry).await,
        }

        let result = self.admit(token, upload, submission).await;
        if let Err(err) = &result {
            warn!(token, error = %err, "ingestion failed");
            if let Err(e) = self.uploads.fail(token) {
                warn!(token, error = %e, "could not mark upload failed");
            }
        }
        result
    }

    fn validate<R>(
        &self,
        upload: Option<Upload<R>>,
        submission: &ThreadSubmission,
    ) -> Result<Upload<R>, IngestError> {
        let limits = &self.limits;
        if submission.subject.chars().count() > limits.max_subject_chars {
            return Err(IngestError::SubjectTooLong {
                limit: limits.max_subject_chars,
            });
        }
        if submission.body.chars().count() > limits.max_body_chars {
            return Err(IngestError::BodyTooLong {
                limit: limits.max_body_chars,
            });
        }
        let upload = upload.ok_or(IngestError::MissingFile)?;
        if upload
            .declared_size
            .is_some_and(|size| size > limits.max_upload_bytes)
        {
            return Err(IngestError::TooLarge {
                limit: limits.max_upload_bytes,
            });
        }
        Ok(upload)
    }

    async fn admit<R>(
        &self,
        token: &str,
        upload: Upload<R>,
        submission: ThreadSubmission,
    ) -> Result<Outcome, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let file_name = upload.file_name;
        let spooled = self.spool(upload.reader).await?;

        let processor = self.processor.clone();
        let path = spooled.path().to_path_buf();
        let metadata = tokio::task::spawn_blocking(move || processor.store_original(&path))
            .await?
            .map_err(|e| {
                if e.is_bad_image() {
                    IngestError::InvalidImage(e)
                } else {
                    IngestError::SaveOriginal(e)
                }
            })?;
        let image_id = metadata.id;
        info!(token, %image_id, %file_name, format = %metadata.format, "original stored");

        if let Err(e) = self
            .uploads
            .update(token, UploadState::Processing, Some(image_id))
        {
            debug!(token, error = %e, "upload entry gone before processing");
        }
        self.queue
            .enqueue(VariantJob {
                token: token.to_string(),
                image_id,
                source: spooled,
            })
            .map_err(|_| IngestError::QueueClosed)?;
        debug!(token, %image_id, queued = self.queue.pending(), "variant job queued");

        let thread_id = self
            .threads
            .create_thread(NewThread {
                image_id,
                subject: submission.subject,
                body: submission.body,
                board_id: submission.board_id,
            })
            .await?;
        if let Err(e) = self.uploads.attach_thread(token, thread_id) {
            debug!(token, error = %e, "upload entry gone before thread attached");
        }
        info!(token, %image_id, thread_id, "thread created");
        Ok(Outcome::Created {
            thread_id,
            image_id,
        })
    }

    /// Copy the upload into `temp_dir`, enforcing the byte ceiling.
    ///
    /// The reader is dropped as soon as the copy ends.
    async fn spool<R>(&self, mut reader: R) -> Result<NamedTempFile, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let limit = self.limits.max_upload_bytes;
        let spooled = NamedTempFile::new_in(&self.processor.storage().temp_dir)
            .map_err(IngestError::TempFile)?;
        let mut file = tokio::fs::File::from_std(spooled.reopen().map_err(IngestError::TempFile)?);

        let copied = tokio::io::copy(&mut (&mut reader).take(limit.saturating_add(1)), &mut file)
            .await
            .map_err(IngestError::TempFile)?;
        drop(reader);
        file.flush().await.map_err(IngestError::TempFile)?;

        if copied > limit {
            return Err(IngestError::TooLarge { limit });
        }
        if copied == 0 {
            return Err(IngestError::MissingFile);
        }
        Ok(spooled)
    }

    /// Answer a resubmission from what the first submission recorded.
    async fn resolve_existing(&self, entry: UploadEntry) -> Result<Outcome, IngestError> {
        if let Some(thread_id) = entry.thread_id {
            return Ok(Outcome::Existing { thread_id });
        }
        if let Some(image_id) = entry.image_id {
            if let Some(thread_id) = self.threads.find_by_image(image_id).await? {
                return Ok(Outcome::Existing { thread_id });
            }
        }
        match entry.state {
            UploadState::Created | UploadState::Processing => Err(IngestError::InProgress {
                image_id: entry.image_id,
            }),
            UploadState::Succeeded | UploadState::Failed => Err(IngestError::StaleToken),
        }
    }
}
