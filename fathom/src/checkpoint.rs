//! Durable run snapshots and the checkpoint store protocol.
//!
//! One latest [`Checkpoint`] is kept per thread id. The engine saves a
//! checkpoint after each step and once more at the end of a successful
//! run; `checkpoint-saved` is emitted only after [`CheckpointStore::save`]
//! returns. Concurrent runs on the same thread id are the caller's
//! responsibility; no locking is performed here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approval::PendingInterrupt;
use crate::error::CheckpointError;
use crate::message::Message;
use crate::state::StateSnapshot;

/// Durable snapshot of a run on one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The thread this checkpoint belongs to.
    pub thread_id: String,
    /// Cumulative step count across resumes.
    pub step: usize,
    /// The post-patch, post-summarization message history.
    pub messages: Vec<Message>,
    /// State snapshot at checkpoint time.
    pub state: StateSnapshot,
    /// Pending approval interrupt, if the run is suspended on one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<PendingInterrupt>,
    /// Creation timestamp (ISO-8601 UTC); stable across updates.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (ISO-8601 UTC).
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a fresh checkpoint for a thread.
    #[must_use]
    pub fn new(
        thread_id: impl Into<String>,
        step: usize,
        messages: Vec<Message>,
        state: StateSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            step,
            messages,
            state,
            interrupt: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The store protocol the engine persists checkpoints through.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Durably save a checkpoint, replacing any previous one for the
    /// same thread id.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Load the latest checkpoint for a thread, or `None`.
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, mut checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = records.get(&checkpoint.thread_id) {
            checkpoint.created_at = previous.created_at;
        }
        checkpoint.updated_at = Utc::now();
        records.insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread_id)
            .cloned())
    }
}

/// File-based checkpoint store: one JSON document per thread id,
/// written via a temporary file then renamed so a crash never leaves a
/// half-written record.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, thread_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", crate::evict::sanitize_id(thread_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, mut checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if let Some(previous) = self.load(&checkpoint.thread_id).await? {
            checkpoint.created_at = previous.created_at;
        }
        checkpoint.updated_at = Utc::now();

        let path = self.record_path(&checkpoint.thread_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.record_path(thread_id);
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
