//! Disk-rooted backend with local shell execution.
//!
//! All virtual paths are resolved inside the root directory; attempts
//! to escape it are rejected. The backend also implements
//! [`SandboxBackend`] by running commands through `sh -c` with the
//! root as working directory, a wall-clock timeout, and an output cap.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use super::{
    Backend, BackendResult, DEFAULT_EXECUTE_TIMEOUT, ExecuteResult, FileInfo, GrepMatch,
    MAX_EXECUTE_OUTPUT, SandboxBackend, apply_edit, normalize_path, render_numbered,
};
use crate::cancel::CancelToken;
use crate::error::BackendError;
use crate::state::FileData;

/// Cap on grep matches returned from a disk walk.
const GREP_MATCH_CAP: usize = 500;

/// Truncate in place, backing off to the nearest char boundary.
fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// Backend rooted at a real directory.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    root: PathBuf,
    sandbox_id: String,
    execute_timeout: Duration,
}

impl DiskBackend {
    /// Create a backend rooted at `root`, creating the directory if
    /// needed.
    pub fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self {
            root,
            sandbox_id: "local".to_owned(),
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
        })
    }

    /// Override the sandbox identifier.
    #[must_use]
    pub fn with_sandbox_id(mut self, id: impl Into<String>) -> Self {
        self.sandbox_id = id.into();
        self
    }

    /// Override the execute timeout.
    #[must_use]
    pub const fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path inside the root, rejecting escapes.
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let virtual_path = normalize_path(path);
        let relative = virtual_path.trim_start_matches('/');
        let candidate = Path::new(relative);
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(BackendError::InvalidPath(path.to_owned())),
            }
        }
        Ok(self.root.join(candidate))
    }

    /// Map an absolute path under the root back to its virtual form.
    fn to_virtual(&self, absolute: &Path) -> String {
        let relative = absolute.strip_prefix(&self.root).unwrap_or(absolute);
        normalize_path(&relative.to_string_lossy())
    }

    fn file_info(&self, absolute: &Path, metadata: &std::fs::Metadata) -> FileInfo {
        let mut info = if metadata.is_dir() {
            FileInfo::dir(self.to_virtual(absolute))
        } else {
            FileInfo::file(self.to_virtual(absolute))
        };
        info.size = (!metadata.is_dir()).then(|| metadata.len());
        info.modified_at = metadata
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        info
    }

    fn walk_files(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.walk_files(&path, out);
            } else {
                out.push(path);
            }
        }
    }
}

#[async_trait]
impl Backend for DiskBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let dir = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(self.file_info(&entry.path(), &metadata));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let data = self.read_raw(path).await?;
        Ok(render_numbered(&data.content, offset, limit))
    }

    async fn read_raw(&self, path: &str) -> BackendResult<FileData> {
        let absolute = self.resolve(path)?;
        if !absolute.is_file() {
            return Err(BackendError::NotFound(normalize_path(path)));
        }
        let text = tokio::fs::read_to_string(&absolute).await?;
        let metadata = tokio::fs::metadata(&absolute).await?;
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let created = metadata
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(modified);

        let mut data = FileData::from_text(&text);
        data.created_at = created;
        data.modified_at = modified;
        Ok(data)
    }

    async fn grep_raw(&self, pattern: &str, path: Option<&str>) -> BackendResult<Vec<GrepMatch>> {
        let regex = Regex::new(pattern)
            .map_err(|err| BackendError::InvalidPattern(err.to_string()))?;
        let start = match path {
            Some(path) => self.resolve(path)?,
            None => self.root.clone(),
        };

        let mut files = Vec::new();
        if start.is_file() {
            files.push(start);
        } else {
            self.walk_files(&start, &mut files);
        }
        files.sort();

        let mut matches = Vec::new();
        for file in files {
            // Binary or non-utf8 files are skipped.
            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (index, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(GrepMatch {
                        path: self.to_virtual(&file),
                        line_number: index + 1,
                        line: line.to_owned(),
                    });
                    if matches.len() >= GREP_MATCH_CAP {
                        return Ok(matches);
                    }
                }
            }
        }
        Ok(matches)
    }

    async fn glob_info(&self, pattern: &str) -> BackendResult<Vec<FileInfo>> {
        let relative = normalize_path(pattern);
        let full_pattern = format!(
            "{}{}",
            self.root.to_string_lossy(),
            relative
        );
        let paths = glob::glob(&full_pattern)
            .map_err(|err| BackendError::InvalidPattern(err.to_string()))?;

        let mut entries = Vec::new();
        for path in paths.flatten() {
            let Ok(metadata) = path.metadata() else {
                continue;
            };
            entries.push(self.file_info(&path, &metadata));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<()> {
        let absolute = self.resolve(path)?;
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, content).await?;
        Ok(())
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<usize> {
        let absolute = self.resolve(path)?;
        if !absolute.is_file() {
            return Err(BackendError::NotFound(normalize_path(path)));
        }
        let text = tokio::fs::read_to_string(&absolute).await?;
        let (updated, count) = apply_edit(&normalize_path(path), &text, old, new, replace_all)?;
        tokio::fs::write(&absolute, updated).await?;
        Ok(count)
    }

    fn as_sandbox(&self) -> Option<&dyn SandboxBackend> {
        Some(self)
    }
}

#[async_trait]
impl SandboxBackend for DiskBackend {
    fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    async fn execute(
        &self,
        command: &str,
        cancel: &CancelToken,
    ) -> BackendResult<ExecuteResult> {
        debug!(command, root = %self.root.display(), "executing sandbox command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            result = tokio::time::timeout(self.execute_timeout, cmd.output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(ExecuteResult {
                        stdout: String::new(),
                        stderr: format!(
                            "command timed out after {}s",
                            self.execute_timeout.as_secs()
                        ),
                        exit_code: -1,
                        truncated: false,
                    });
                }
            },
            () = cancel.cancelled() => {
                return Ok(ExecuteResult {
                    stdout: String::new(),
                    stderr: "command cancelled".to_owned(),
                    exit_code: -1,
                    truncated: false,
                });
            }
        };

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let mut truncated = false;

        if stdout.len() > MAX_EXECUTE_OUTPUT {
            truncate_at_char_boundary(&mut stdout, MAX_EXECUTE_OUTPUT);
            stderr.clear();
            truncated = true;
        } else if stdout.len() + stderr.len() > MAX_EXECUTE_OUTPUT {
            truncate_at_char_boundary(&mut stderr, MAX_EXECUTE_OUTPUT - stdout.len());
            truncated = true;
        }

        Ok(ExecuteResult {
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, DiskBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = DiskBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn write_read_round_trip() {
        let (_dir, backend) = backend();
        backend.write("/notes/a.md", "alpha\nbeta").await.unwrap();

        let data = backend.read_raw("/notes/a.md").await.unwrap();
        assert_eq!(data.content, vec!["alpha", "beta"]);

        let numbered = backend.read("/notes/a.md", 0, 10).await.unwrap();
        assert!(numbered.starts_with("     1\talpha"));
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let (_dir, backend) = backend();
        let err = backend.read_raw("/../outside").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn ls_lists_entries() {
        let (_dir, backend) = backend();
        backend.write("/a.txt", "x").await.unwrap();
        backend.write("/sub/b.txt", "y").await.unwrap();

        let entries = backend.ls_info("/").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/sub"]);
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn glob_and_grep_find_files() {
        let (_dir, backend) = backend();
        backend.write("/src/main.rs", "fn main() {}").await.unwrap();
        backend.write("/src/lib.rs", "pub fn lib() {}").await.unwrap();
        backend.write("/readme.md", "# hi").await.unwrap();

        let entries = backend.glob_info("/src/*.rs").await.unwrap();
        assert_eq!(entries.len(), 2);

        let matches = backend.grep_raw(r"fn \w+\(\)", Some("/src")).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line_number, 1);
    }

    #[tokio::test]
    async fn edit_applies_uniquely() {
        let (_dir, backend) = backend();
        backend.write("/f.txt", "old old").await.unwrap();
        assert!(backend.edit("/f.txt", "old", "new", false).await.is_err());
        let count = backend.edit("/f.txt", "old", "new", true).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(backend.read_raw("/f.txt").await.unwrap().text(), "new new");
    }

    #[tokio::test]
    async fn execute_captures_output_and_exit_code() {
        let (_dir, backend) = backend();
        let cancel = CancelToken::new();

        let result = backend.execute("echo hello", &cancel).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, 0);
        assert!(!result.truncated);

        let result = backend.execute("exit 3", &cancel).await.unwrap();
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn execute_runs_in_root() {
        let (_dir, backend) = backend();
        backend.write("/probe.txt", "x").await.unwrap();
        let cancel = CancelToken::new();
        let result = backend.execute("ls", &cancel).await.unwrap();
        assert!(result.stdout.contains("probe.txt"));
    }

    #[tokio::test]
    async fn execute_times_out() {
        let (_dir, backend) = backend();
        let backend = backend.with_execute_timeout(Duration::from_millis(50));
        let cancel = CancelToken::new();
        let result = backend.execute("sleep 5", &cancel).await.unwrap();
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn execute_honors_cancellation() {
        let (_dir, backend) = backend();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = backend.execute("sleep 5", &cancel).await.unwrap();
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.contains("cancelled"));
    }

    #[tokio::test]
    async fn advertises_sandbox() {
        let (_dir, backend) = backend();
        assert!(backend.as_sandbox().is_some());
        assert_eq!(backend.as_sandbox().unwrap().sandbox_id(), "local");
    }
}
