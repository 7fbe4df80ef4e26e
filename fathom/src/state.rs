//! Shared mutable run state: the todo list and the virtual filesystem.
//!
//! One [`AgentState`] is owned by a single invocation and mutated
//! exclusively by tools. Sub-agents receive a partitioned view via
//! [`AgentState::child`]: the `files` map is shared by reference, the
//! todo list is fresh. Because tool executions are strictly serialized
//! by the engine, the internal locks are uncontended and only exist to
//! make the sharing expressible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a [`TodoItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not yet started.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Finished.
    Completed,
    /// Abandoned.
    Cancelled,
}

/// A single entry in the agent's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TodoItem {
    /// Stable identifier for the item.
    pub id: String,
    /// Human-readable description of the work.
    pub content: String,
    /// Current status.
    pub status: TodoStatus,
}

impl TodoItem {
    /// Create a new pending todo item.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            status: TodoStatus::Pending,
        }
    }
}

/// A file in the virtual filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// File content as an ordered sequence of lines.
    pub content: Vec<String>,
    /// Creation timestamp (ISO-8601 UTC).
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp (ISO-8601 UTC).
    pub modified_at: DateTime<Utc>,
}

impl FileData {
    /// Create file data from a text blob, splitting on newlines.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let now = Utc::now();
        Self {
            content: split_lines(text),
            created_at: now,
            modified_at: now,
        }
    }

    /// Reassemble the line sequence into a single string.
    #[must_use]
    pub fn text(&self) -> String {
        self.content.join("\n")
    }

    /// Replace the content, bumping the modification timestamp.
    pub fn set_text(&mut self, text: &str) {
        self.content = split_lines(text);
        self.modified_at = Utc::now();
    }
}

fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(str::to_owned).collect()
}

/// Serializable owned snapshot of an [`AgentState`].
///
/// Used for checkpoints and the terminal `done` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// The todo list at snapshot time.
    pub todos: Vec<TodoItem>,
    /// The virtual filesystem at snapshot time.
    pub files: HashMap<String, FileData>,
}

/// The shared mutable aggregate `{ todos, files }`.
///
/// Cloning an `AgentState` clones the handles, not the data: both
/// clones observe the same todos and files. Use [`AgentState::child`]
/// for the sub-agent partition (shared files, fresh todos).
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    todos: Arc<Mutex<Vec<TodoItem>>>,
    files: Arc<Mutex<HashMap<String, FileData>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AgentState {
    /// Create a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            todos: Arc::new(Mutex::new(snapshot.todos)),
            files: Arc::new(Mutex::new(snapshot.files)),
        }
    }

    /// Partitioned view for a sub-agent: the files map is shared by
    /// reference, the todo list is fresh.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            todos: Arc::new(Mutex::new(Vec::new())),
            files: Arc::clone(&self.files),
        }
    }

    /// Take an owned, serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            todos: lock(&self.todos).clone(),
            files: lock(&self.files).clone(),
        }
    }

    /// Restore todos and files from a snapshot in place.
    pub fn restore(&self, snapshot: StateSnapshot) {
        *lock(&self.todos) = snapshot.todos;
        *lock(&self.files) = snapshot.files;
    }

    /// Current todo list.
    #[must_use]
    pub fn todos(&self) -> Vec<TodoItem> {
        lock(&self.todos).clone()
    }

    /// Replace the todo list.
    pub fn set_todos(&self, todos: Vec<TodoItem>) {
        *lock(&self.todos) = todos;
    }

    /// Number of files in the virtual filesystem.
    #[must_use]
    pub fn file_count(&self) -> usize {
        lock(&self.files).len()
    }

    /// Look up a file by path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<FileData> {
        lock(&self.files).get(path).cloned()
    }

    /// All file paths, sorted.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.files).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Insert or overwrite a file. Preserves `created_at` on overwrite.
    pub fn put_file(&self, path: impl Into<String>, text: &str) {
        let path = path.into();
        let mut files = lock(&self.files);
        match files.get_mut(&path) {
            Some(existing) => existing.set_text(text),
            None => {
                files.insert(path, FileData::from_text(text));
            }
        }
    }

    /// Run a closure against a mutable file entry, if present.
    pub fn with_file_mut<R>(&self, path: &str, f: impl FnOnce(&mut FileData) -> R) -> Option<R> {
        lock(&self.files).get_mut(path).map(f)
    }

    /// Run a closure against the whole file map.
    pub fn with_files<R>(&self, f: impl FnOnce(&HashMap<String, FileData>) -> R) -> R {
        f(&lock(&self.files))
    }

    /// Whether this state shares its files map with `other`.
    #[must_use]
    pub fn shares_files_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.files, &other.files)
    }
}
