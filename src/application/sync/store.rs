use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("`{0}` not found in content store")]
    NotFound(String),
    #[error("content store responded with {status}: {body}")]
    Http { status: u16, body: String },
    #[error("content store request failed: {0}")]
    Transport(String),
    #[error("content store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("content could not be decoded: {0}")]
    Decode(String),
    #[error("content store misconfigured: {0}")]
    Configuration(String),
}

/// A Markdown file listed by a content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Repository-relative path such as `content/posts/tech/hello.md`.
    pub path: String,
}

/// A tree of Markdown files: the GitHub repository or a local mirror of it.
#[async_trait]
pub trait ContentStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every `.md` file under `content/posts`.
    async fn list_markdown(&self) -> Result<Vec<ContentEntry>, ContentStoreError>;

    async fn read(&self, path: &str) -> Result<String, ContentStoreError>;

    /// Create or replace the file at `path`.
    async fn put(&self, path: &str, content: &str, message: &str) -> Result<(), ContentStoreError>;

    /// Remove the file at `path`; a missing file is not an error.
    async fn delete(&self, path: &str, message: &str) -> Result<(), ContentStoreError>;
}
