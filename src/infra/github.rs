//! GitHub REST content store.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::sync::{ContentEntry, ContentStore, ContentStoreError};
use crate::infra::error::InfraError;

const POSTS_PREFIX: &str = "content/posts/";
const ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub api_base: Url,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct GithubContentStore {
    client: Client,
    settings: GithubSettings,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: String,
    branch: &'a str,
}

impl GithubContentStore {
    pub fn new(settings: GithubSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn user_agent() -> &'static str {
        concat!("inkbridge/", env!("CARGO_PKG_VERSION"))
    }

    fn repo_url(&self, segments: &[&str]) -> Result<Url, ContentStoreError> {
        let mut url = self.settings.api_base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ContentStoreError::Configuration("github api base cannot be a base url".into())
            })?;
            path.pop_if_empty().extend([
                "repos",
                self.settings.owner.as_str(),
                self.settings.repo.as_str(),
            ]);
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    fn contents_url(&self, path: &str) -> Result<Url, ContentStoreError> {
        self.repo_url(&["contents", path])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(header::ACCEPT, ACCEPT)
            .header(
                header::AUTHORIZATION,
                format!("token {}", self.settings.token),
            )
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ContentStoreError> {
        builder
            .send()
            .await
            .map_err(|err| ContentStoreError::Transport(err.to_string()))
    }

    async fn fail(path: &str, response: Response) -> ContentStoreError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ContentStoreError::NotFound(path.to_string());
        }
        let body = response.text().await.unwrap_or_default();
        ContentStoreError::Http {
            status: status.as_u16(),
            body,
        }
    }

    async fn fetch_content(&self, path: &str) -> Result<Option<ContentResponse>, ContentStoreError> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", &self.settings.branch);

        let response = self.send(self.request(Method::GET, url)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<ContentResponse>()
                .await
                .map(Some)
                .map_err(|err| ContentStoreError::Decode(err.to_string())),
            _ => Err(Self::fail(path, response).await),
        }
    }
}

#[async_trait]
impl ContentStore for GithubContentStore {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_markdown(&self) -> Result<Vec<ContentEntry>, ContentStoreError> {
        let mut url = self.repo_url(&["git", "trees", self.settings.branch.as_str()])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self.send(self.request(Method::GET, url)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(&self.settings.branch, response).await);
        }
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|err| ContentStoreError::Decode(err.to_string()))?;

        let mut entries: Vec<ContentEntry> = tree
            .tree
            .into_iter()
            .filter(|entry| {
                entry.kind == "blob"
                    && entry.path.starts_with(POSTS_PREFIX)
                    && entry.path.ends_with(".md")
            })
            .map(|entry| ContentEntry { path: entry.path })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            target = "inkbridge::github",
            files = entries.len(),
            "listed markdown files"
        );
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<String, ContentStoreError> {
        let content = self
            .fetch_content(path)
            .await?
            .ok_or_else(|| ContentStoreError::NotFound(path.to_string()))?;

        let cleaned: String = content
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(cleaned)
            .map_err(|err| ContentStoreError::Decode(format!("{path}: {err}")))?;
        String::from_utf8(bytes).map_err(|err| ContentStoreError::Decode(format!("{path}: {err}")))
    }

    async fn put(&self, path: &str, content: &str, message: &str) -> Result<(), ContentStoreError> {
        let sha = self.fetch_content(path).await?.map(|existing| existing.sha);
        let body = PutBody {
            message,
            content: STANDARD.encode(content),
            branch: &self.settings.branch,
            sha,
        };

        let url = self.contents_url(path)?;
        let response = self.send(self.request(Method::PUT, url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(Self::fail(path, response).await);
        }

        debug!(target = "inkbridge::github", path = %path, "file written");
        Ok(())
    }

    async fn delete(&self, path: &str, message: &str) -> Result<(), ContentStoreError> {
        let Some(existing) = self.fetch_content(path).await? else {
            debug!(target = "inkbridge::github", path = %path, "file already absent");
            return Ok(());
        };
        let body = DeleteBody {
            message,
            sha: existing.sha,
            branch: &self.settings.branch,
        };

        let url = self.contents_url(path)?;
        let response = self
            .send(self.request(Method::DELETE, url).json(&body))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::fail(path, response).await),
        }
    }
}
