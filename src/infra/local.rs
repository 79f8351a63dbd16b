//! Filesystem content store rooted at a local mirror of the content repository.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::application::sync::{ContentEntry, ContentStore, ContentStoreError};

const POSTS_DIR: &str = "content/posts";

#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a repository-relative path, rejecting anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, ContentStoreError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.is_empty() {
            return Err(ContentStoreError::Configuration(format!(
                "path `{path}` is outside the content root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn walk_markdown(root: PathBuf) -> io::Result<Vec<ContentEntry>> {
    let posts = root.join(POSTS_DIR);
    if !posts.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(&posts).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|ext| ext.to_str()) != Some("md")
        {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(ContentEntry { path });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[async_trait]
impl ContentStore for LocalContentStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list_markdown(&self) -> Result<Vec<ContentEntry>, ContentStoreError> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || walk_markdown(root))
            .await
            .map_err(|err| ContentStoreError::Io(io::Error::other(err)))??;

        debug!(
            target = "inkbridge::local",
            root = %self.root.display(),
            files = entries.len(),
            "listed markdown files"
        );
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<String, ContentStoreError> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ContentStoreError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, path: &str, content: &str, _message: &str) -> Result<(), ContentStoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }

    async fn delete(&self, path: &str, _message: &str) -> Result<(), ContentStoreError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_markdown_under_posts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalContentStore::new(dir.path());
        store
            .put("content/posts/tech/hello.md", "# hi", "")
            .await
            .expect("write md");
        store
            .put("content/posts/tech/cover.png", "png", "")
            .await
            .expect("write png");
        store
            .put("content/pages/about.md", "about", "")
            .await
            .expect("write page");

        let entries = store.list_markdown().await.expect("list");
        assert_eq!(
            entries,
            vec![ContentEntry {
                path: "content/posts/tech/hello.md".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalContentStore::new(dir.path().join("absent"));
        assert!(store.list_markdown().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_file_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalContentStore::new(dir.path());
        store
            .delete("content/posts/tech/gone.md", "")
            .await
            .expect("idempotent delete");
    }

    #[tokio::test]
    async fn read_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalContentStore::new(dir.path());
        let err = store
            .read("content/posts/tech/gone.md")
            .await
            .expect_err("missing");
        assert!(matches!(err, ContentStoreError::NotFound(_)));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let store = LocalContentStore::new("/tmp/content");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
    }
}
