use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::CatalogError;

const GCS_BASE_URL: &str = "https://storage.googleapis.com";

/// Read-only access to objects by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, CatalogError>;

    /// Addressable URI of the object, used in logs and prompts.
    fn uri(&self, key: &str) -> String;
}

/// Google Cloud Storage bucket read through the JSON API.
#[derive(Clone)]
pub struct GcsStore {
    base_url: String,
    bucket: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl GcsStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            base_url: GCS_BASE_URL.to_string(),
            bucket: bucket.into(),
            access_token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn object_url(&self, key: &str) -> Result<Url, CatalogError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CatalogError::upstream(format!("bad storage url {}: {}", self.base_url, e)))?;

        // Object names go in a single path segment, so '/' is percent-encoded.
        url.path_segments_mut()
            .map_err(|_| CatalogError::upstream(format!("bad storage url {}", self.base_url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", key]);
        url.query_pairs_mut().append_pair("alt", "media");

        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, CatalogError> {
        let url = self.object_url(key)?;
        tracing::debug!(uri = %self.uri(key), "Fetching object");

        let mut request = self.client.get(url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::upstream(format!("GET {}: {}", self.uri(key), e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(CatalogError::not_found("object", self.uri(key))),
            status => {
                return Err(CatalogError::upstream(format!(
                    "GET {} returned {}",
                    self.uri(key),
                    status
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::upstream(format!("reading {}: {}", self.uri(key), e)))?;

        Ok(bytes.to_vec())
    }

    fn uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }
}

/// Directory on local disk laid out like the bucket.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, CatalogError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(CatalogError::InvalidKey {
                what: "object",
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, CatalogError> {
        let path = self.resolve(key)?;

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CatalogError::not_found("object", self.uri(key)),
            _ => CatalogError::upstream(format!("reading {:?}: {}", path, e)),
        })
    }

    fn uri(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}
