//! Thread records.
//!
//! The relational store for boards and threads lives outside this crate. The
//! ingestion flow only needs to create a thread for a stored image and to find
//! the thread that already references an image, so that is all the
//! [`ThreadRepository`] seam exposes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type ThreadId = i64;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("thread store unavailable: {0}")]
    Unavailable(String),
    #[error("image {0} already has a thread")]
    Duplicate(Uuid),
}

/// Input for a new thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewThread {
    pub image_id: Uuid,
    pub subject: String,
    pub body: String,
    pub board_id: Option<i64>,
}

#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// Insert a thread and return its generated id.
    async fn create_thread(&self, thread: NewThread) -> Result<ThreadId, RepositoryError>;

    /// The thread whose opening post references `image_id`, if any.
    async fn find_by_image(&self, image_id: Uuid) -> Result<Option<ThreadId>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredThread {
    pub id: ThreadId,
    #[serde(flatten)]
    pub thread: NewThread,
}

/// In-process thread store with sequential ids starting at 1.
#[derive(Debug, Default)]
pub struct MemoryThreadRepository {
    threads: Mutex<Vec<StoredThread>>,
}

impl MemoryThreadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }
}

#[async_trait]
impl ThreadRepository for MemoryThreadRepository {
    async fn create_thread(&self, thread: NewThread) -> Result<ThreadId, RepositoryError> {
        let mut threads = self.threads.lock();
        if threads.iter().any(|t| t.thread.image_id == thread.image_id) {
            return Err(RepositoryError::Duplicate(thread.image_id));
        }
        let id = threads.len() as ThreadId + 1;
        threads.push(StoredThread { id, thread });
        Ok(id)
    }

    async fn find_by_image(&self, image_id: Uuid) -> Result<Option<ThreadId>, RepositoryError> {
        Ok(self
            .threads
            .lock()
            .iter()
            .find(|t| t.thread.image_id == image_id)
            .map(|t| t.id))
    }
}
