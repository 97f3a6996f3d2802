//! Upload state keyed by idempotency token.
//!
//! A token is minted before the upload form is rendered and travels back with
//! the submission. Its entry moves strictly forward:
//!
//! ```text
//! Created → Processing → Succeeded
//!                      ↘ Failed
//! ```
//!
//! Only the first submission for a token gets past [`UploadStateStore::claim`];
//! later ones see the existing entry and are redirected to its thread.
//!
//! The store is a short-lived coordination cache. Entries of any state are
//! dropped once older than the configured TTL by [`run_sweeper`].

use crate::threads::ThreadId;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Created,
    Processing,
    Succeeded,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Succeeded | UploadState::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle forward-only.
    /// Processing → Processing is allowed so the image id can be attached.
    pub fn allows(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Created, Processing)
                | (Processing, Processing)
                | (Processing, Succeeded)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadState::Created => "created",
            UploadState::Processing => "processing",
            UploadState::Succeeded => "succeeded",
            UploadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadEntry {
    pub created_at: DateTime<Utc>,
    pub state: UploadState,
    /// Set once the original has been stored.
    pub image_id: Option<Uuid>,
    /// Set once the thread record exists.
    pub thread_id: Option<ThreadId>,
}

impl UploadEntry {
    fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            state: UploadState::Created,
            image_id: None,
            thread_id: None,
        }
    }
}

/// Result of trying to start processing for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The entry moved from Created to Processing; the caller owns the upload.
    Admitted,
    Unknown,
    /// Another submission already left Created.
    AlreadyStarted(UploadEntry),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadStateError {
    #[error("unknown upload token")]
    UnknownToken,
    #[error("invalid upload state transition {from} → {to}")]
    InvalidTransition { from: UploadState, to: UploadState },
}

#[derive(Debug, Default)]
pub struct UploadStateStore {
    entries: RwLock<HashMap<String, UploadEntry>>,
}

impl UploadStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh token in state Created.
    pub fn new_token(&self) -> String {
        self.new_token_at(Utc::now())
    }

    pub fn new_token_at(&self, created_at: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.entries
            .write()
            .insert(token.clone(), UploadEntry::new(created_at));
        token
    }

    /// Register a caller-chosen token in state Created. Returns `false` and
    /// leaves the existing entry alone if the token is already known.
    pub fn insert(&self, token: &str) -> bool {
        self.insert_at(token, Utc::now())
    }

    pub fn insert_at(&self, token: &str, created_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(token) {
            return false;
        }
        entries.insert(token.to_string(), UploadEntry::new(created_at));
        true
    }

    pub fn get(&self, token: &str) -> Option<UploadEntry> {
        self.entries.read().get(token).cloned()
    }

    /// Atomically check that `token` is still Created and move it to Processing.
    pub fn claim(&self, token: &str) -> Claim {
        let mut entries = self.entries.write();
        match entries.get_mut(token) {
            None => Claim::Unknown,
            Some(entry) if entry.state == UploadState::Created => {
                entry.state = UploadState::Processing;
                Claim::Admitted
            }
            Some(entry) => Claim::AlreadyStarted(entry.clone()),
        }
    }

    /// Move `token` to `state`, attaching `image_id` when given.
    pub fn update(
        &self,
        token: &str,
        state: UploadState,
        image_id: Option<Uuid>,
    ) -> Result<UploadEntry, UploadStateError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(token)
            .ok_or(UploadStateError::UnknownToken)?;
        if !entry.state.allows(state) {
            return Err(UploadStateError::InvalidTransition {
                from: entry.state,
                to: state,
            });
        }
        entry.state = state;
        if image_id.is_some() {
            entry.image_id = image_id;
        }
        Ok(entry.clone())
    }

    /// Mark the upload as failed from the request side.
    ///
    /// Unlike [`update`](Self::update) this also overrides a Succeeded entry
    /// that has no thread: the variant worker may finish before the request
    /// does, and a request that failed must not leave a successful entry
    /// behind. An entry that already has its thread is left untouched.
    pub fn fail(&self, token: &str) -> Result<UploadEntry, UploadStateError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(token)
            .ok_or(UploadStateError::UnknownToken)?;
        match (entry.state, entry.thread_id) {
            (UploadState::Failed, _) => {}
            (UploadState::Processing, _) | (UploadState::Succeeded, None) => {
                entry.state = UploadState::Failed;
            }
            (from, _) => {
                return Err(UploadStateError::InvalidTransition {
                    from,
                    to: UploadState::Failed,
                });
            }
        }
        Ok(entry.clone())
    }

    pub fn attach_thread(&self, token: &str, thread_id: ThreadId) -> Result<(), UploadStateError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(token)
            .ok_or(UploadStateError::UnknownToken)?;
        entry.thread_id = Some(thread_id);
        Ok(())
    }

    /// Drop every entry created before `now - max_age`, whatever its state.
    /// Returns the number removed.
    pub fn sweep_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return 0;
        };
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at >= cutoff);
        before - entries.len()
    }

    pub fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_at(Utc::now(), max_age)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Sweep `store` every `interval` until `cancel` fires.
pub async fn run_sweeper(
    store: Arc<UploadStateStore>,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Sweeper cancelled");
                break;
            },
            _ = ticker.tick() => {
                let removed = store.sweep(max_age);
                if removed > 0 {
                    info!(removed, remaining = store.len(), "swept expired upload tokens");
                }
            }
        }
    }
    info!("Sweeper stopped.");
}
