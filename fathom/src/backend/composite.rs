//! Prefix-routing composite backend.
//!
//! Routes each operation to the mounted backend with the longest
//! matching path prefix, falling back to a default backend. Paths are
//! rewritten relative to the mount point on the way in and re-prefixed
//! on the way out, so mounted backends see rooted paths.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    Backend, BackendResult, FileInfo, GrepMatch, SandboxBackend, normalize_path,
};
use crate::state::FileData;

/// A backend that routes by path prefix.
pub struct CompositeBackend {
    /// Mounts sorted by descending prefix length.
    mounts: Vec<(String, Arc<dyn Backend>)>,
    fallback: Arc<dyn Backend>,
}

impl std::fmt::Debug for CompositeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.mounts.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("CompositeBackend")
            .field("mounts", &prefixes)
            .finish_non_exhaustive()
    }
}

impl CompositeBackend {
    /// Create a composite with the given fallback backend.
    #[must_use]
    pub fn new(fallback: Arc<dyn Backend>) -> Self {
        Self {
            mounts: Vec::new(),
            fallback,
        }
    }

    /// Mount a backend under a path prefix.
    #[must_use]
    pub fn mount(mut self, prefix: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        let prefix = normalize_path(&prefix.into());
        self.mounts.push((prefix, backend));
        self.mounts
            .sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
        self
    }

    /// Pick the backend for a path and rewrite it relative to the
    /// mount point.
    fn route(&self, path: &str) -> (&Arc<dyn Backend>, String, Option<&str>) {
        let path = normalize_path(path);
        for (prefix, backend) in &self.mounts {
            if path == *prefix {
                return (backend, "/".to_owned(), Some(prefix));
            }
            if let Some(rest) = path.strip_prefix(prefix.as_str())
                && rest.starts_with('/')
            {
                return (backend, rest.to_owned(), Some(prefix));
            }
        }
        (&self.fallback, path, None)
    }

    fn reprefix(path: &str, mount: Option<&str>) -> String {
        match mount {
            Some(prefix) => {
                if path == "/" {
                    prefix.to_owned()
                } else {
                    format!("{prefix}{path}")
                }
            }
            None => path.to_owned(),
        }
    }
}

#[async_trait]
impl Backend for CompositeBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let (backend, inner, mount) = self.route(path);
        let mut entries = backend.ls_info(&inner).await?;
        for entry in &mut entries {
            entry.path = Self::reprefix(&entry.path, mount);
        }
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let (backend, inner, _) = self.route(path);
        backend.read(&inner, offset, limit).await
    }

    async fn read_raw(&self, path: &str) -> BackendResult<FileData> {
        let (backend, inner, _) = self.route(path);
        backend.read_raw(&inner).await
    }

    async fn grep_raw(&self, pattern: &str, path: Option<&str>) -> BackendResult<Vec<GrepMatch>> {
        let (backend, inner, mount) = match path {
            Some(path) => {
                let (backend, inner, mount) = self.route(path);
                (backend, Some(inner), mount)
            }
            None => (&self.fallback, None, None),
        };
        let mut matches = backend.grep_raw(pattern, inner.as_deref()).await?;
        for hit in &mut matches {
            hit.path = Self::reprefix(&hit.path, mount);
        }
        Ok(matches)
    }

    async fn glob_info(&self, pattern: &str) -> BackendResult<Vec<FileInfo>> {
        let (backend, inner, mount) = self.route(pattern);
        let mut entries = backend.glob_info(&inner).await?;
        for entry in &mut entries {
            entry.path = Self::reprefix(&entry.path, mount);
        }
        Ok(entries)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<()> {
        let (backend, inner, _) = self.route(path);
        backend.write(&inner, content).await
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<usize> {
        let (backend, inner, _) = self.route(path);
        backend.edit(&inner, old, new, replace_all).await
    }

    fn as_sandbox(&self) -> Option<&dyn SandboxBackend> {
        self.fallback.as_sandbox()
    }
}
