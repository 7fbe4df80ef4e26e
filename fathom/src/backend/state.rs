//! In-memory backend over the invocation's own file state.
//!
//! This is the default backend: files live in [`AgentState`], so a
//! parent and its sub-agents observe each other's writes through the
//! shared map.

use async_trait::async_trait;
use glob::Pattern;
use regex::Regex;

use super::{
    Backend, BackendResult, FileInfo, GrepMatch, apply_edit, normalize_path, render_numbered,
};
use crate::error::BackendError;
use crate::state::{AgentState, FileData};

/// Backend that reads and writes the virtual filesystem in
/// [`AgentState`].
#[derive(Debug, Clone)]
pub struct StateBackend {
    state: AgentState,
}

impl StateBackend {
    /// Create a backend viewing `state`'s files.
    #[must_use]
    pub fn new(state: AgentState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Backend for StateBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let dir = normalize_path(path);
        let prefix = if dir == "/" {
            "/".to_owned()
        } else {
            format!("{dir}/")
        };

        let mut entries: Vec<FileInfo> = Vec::new();
        let mut seen_dirs: Vec<String> = Vec::new();

        self.state.with_files(|files| {
            for (file_path, data) in files {
                let Some(rest) = file_path.strip_prefix(&prefix) else {
                    continue;
                };
                match rest.split_once('/') {
                    // Direct child file.
                    None => {
                        let mut info = FileInfo::file(file_path.clone());
                        info.size = Some(data.text().len() as u64);
                        info.modified_at = Some(data.modified_at);
                        entries.push(info);
                    }
                    // Nested file: synthesize the child directory once.
                    Some((child, _)) => {
                        let dir_path = format!("{prefix}{child}");
                        if !seen_dirs.contains(&dir_path) {
                            seen_dirs.push(dir_path.clone());
                            entries.push(FileInfo::dir(dir_path));
                        }
                    }
                }
            }
        });

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let data = self.read_raw(path).await?;
        Ok(render_numbered(&data.content, offset, limit))
    }

    async fn read_raw(&self, path: &str) -> BackendResult<FileData> {
        let path = normalize_path(path);
        self.state
            .file(&path)
            .ok_or(BackendError::NotFound(path))
    }

    async fn grep_raw(&self, pattern: &str, path: Option<&str>) -> BackendResult<Vec<GrepMatch>> {
        let regex = Regex::new(pattern)
            .map_err(|err| BackendError::InvalidPattern(err.to_string()))?;
        let scope = path.map(normalize_path);

        let mut matches = Vec::new();
        self.state.with_files(|files| {
            let mut paths: Vec<&String> = files.keys().collect();
            paths.sort();
            for file_path in paths {
                if let Some(scope) = &scope
                    && scope != "/"
                    && !file_path.starts_with(scope.as_str())
                {
                    continue;
                }
                let Some(data) = files.get(file_path) else {
                    continue;
                };
                for (index, line) in data.content.iter().enumerate() {
                    if regex.is_match(line) {
                        matches.push(GrepMatch {
                            path: file_path.clone(),
                            line_number: index + 1,
                            line: line.clone(),
                        });
                    }
                }
            }
        });
        Ok(matches)
    }

    async fn glob_info(&self, pattern: &str) -> BackendResult<Vec<FileInfo>> {
        let pattern = Pattern::new(&normalize_path(pattern))
            .map_err(|err| BackendError::InvalidPattern(err.to_string()))?;

        let mut entries: Vec<FileInfo> = Vec::new();
        self.state.with_files(|files| {
            for (file_path, data) in files {
                if pattern.matches(file_path) {
                    let mut info = FileInfo::file(file_path.clone());
                    info.size = Some(data.text().len() as u64);
                    info.modified_at = Some(data.modified_at);
                    entries.push(info);
                }
            }
        });
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<()> {
        self.state.put_file(normalize_path(path), content);
        Ok(())
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<usize> {
        let path = normalize_path(path);
        let data = self
            .state
            .file(&path)
            .ok_or_else(|| BackendError::NotFound(path.clone()))?;

        let (updated, count) = apply_edit(&path, &data.text(), old, new, replace_all)?;
        self.state.put_file(path, &updated);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_files(files: &[(&str, &str)]) -> (StateBackend, AgentState) {
        let state = AgentState::new();
        for (path, content) in files {
            state.put_file(*path, content);
        }
        (StateBackend::new(state.clone()), state)
    }

    #[tokio::test]
    async fn ls_lists_direct_children_and_synthesizes_dirs() {
        let (backend, _) = backend_with_files(&[
            ("/a.txt", "x"),
            ("/docs/b.txt", "y"),
            ("/docs/deep/c.txt", "z"),
        ]);

        let entries = backend.ls_info("/").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/docs"]);
        assert!(entries[1].is_dir);

        let entries = backend.ls_info("/docs").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs/b.txt", "/docs/deep"]);
    }

    #[tokio::test]
    async fn read_numbers_lines() {
        let (backend, _) = backend_with_files(&[("/f.txt", "one\ntwo\nthree")]);
        let text = backend.read("/f.txt", 1, 1).await.unwrap();
        assert_eq!(text, "     2\ttwo");
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let (backend, _) = backend_with_files(&[]);
        let err = backend.read("/missing", 0, 10).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn grep_finds_lines_with_line_numbers() {
        let (backend, _) =
            backend_with_files(&[("/a.rs", "fn main() {}\nlet x = 1;"), ("/b.rs", "fn other()")]);
        let matches = backend.grep_raw(r"fn \w+", None).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path, "/a.rs");
        assert_eq!(matches[0].line_number, 1);
    }

    #[tokio::test]
    async fn grep_scopes_to_path() {
        let (backend, _) = backend_with_files(&[("/src/a.rs", "hit"), ("/doc/b.md", "hit")]);
        let matches = backend.grep_raw("hit", Some("/src")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "/src/a.rs");
    }

    #[tokio::test]
    async fn grep_rejects_bad_pattern() {
        let (backend, _) = backend_with_files(&[]);
        let err = backend.grep_raw("(unclosed", None).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn glob_matches_patterns() {
        let (backend, _) =
            backend_with_files(&[("/src/a.rs", ""), ("/src/b.txt", ""), ("/c.rs", "")]);
        let entries = backend.glob_info("/src/*.rs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/src/a.rs");

        let entries = backend.glob_info("/*.rs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/c.rs");

        let entries = backend.glob_info("/**/*.rs").await.unwrap();
        assert!(entries.iter().any(|info| info.path == "/src/a.rs"));
    }

    #[tokio::test]
    async fn write_and_edit_round_trip() {
        let (backend, state) = backend_with_files(&[]);
        backend.write("/note.md", "hello world").await.unwrap();
        assert_eq!(state.file("/note.md").unwrap().text(), "hello world");

        let count = backend
            .edit("/note.md", "world", "fathom", false)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(state.file("/note.md").unwrap().text(), "hello fathom");
    }

    #[tokio::test]
    async fn edit_requires_unique_match() {
        let (backend, _) = backend_with_files(&[("/f", "x x")]);
        let err = backend.edit("/f", "x", "y", false).await.unwrap_err();
        assert!(matches!(err, BackendError::EditConflict { .. }));

        let count = backend.edit("/f", "x", "y", true).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn shares_writes_with_state_clones() {
        let (backend, state) = backend_with_files(&[]);
        let child = state.child();
        backend.write("/shared.txt", "visible").await.unwrap();
        assert!(child.file("/shared.txt").is_some());
    }
}
