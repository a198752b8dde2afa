//! HTTP client for the storage network's upload node

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error};

use crate::errors::{DeployError, PublishError};
use crate::publish::client::{Bundle, StorageClient, Tag};

/// Prefix of headers carrying upload tags other than `Content-Type`
pub const TAG_HEADER_PREFIX: &str = "x-tag-";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Storage client talking to an upload node over HTTP
///
/// - `GET  {node}/price/{bytes}` returns the cost as a plain integer
/// - `POST {node}/tx` uploads one object and returns `{"id": ...}`
/// - `POST {node}/bundle` uploads a JSON bundle and returns `{"id": ...}`
pub struct HttpStorageClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpStorageClient {
    /// Create a new client for the node at `base_url`
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn check(response: Response, what: &str) -> Result<Response, PublishError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("{} failed: {} - {}", what, status, body);
        Err(PublishError::Storage(format!("{} failed: {}: {}", what, status, body)))
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn price(&self, bytes: u64) -> Result<u64, PublishError> {
        let url = format!("{}/price/{}", self.base_url, bytes);
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        let body = Self::check(response, "Price query").await?.text().await?;
        body.trim()
            .parse::<u64>()
            .map_err(|e| PublishError::Storage(format!("Unexpected price '{}': {}", body.trim(), e)))
    }

    async fn upload(&self, data: Vec<u8>, tags: &[Tag]) -> Result<String, PublishError> {
        let url = format!("{}/tx", self.base_url);
        debug!("POST {} ({} bytes)", url, data.len());

        let mut request = self.authorize(self.client.post(&url));
        for tag in tags {
            if tag.name.eq_ignore_ascii_case("content-type") {
                request = request.header(header::CONTENT_TYPE, &tag.value);
            } else {
                request = request.header(
                    format!("{}{}", TAG_HEADER_PREFIX, tag.name.to_ascii_lowercase()),
                    &tag.value,
                );
            }
        }

        let response = request.body(data).send().await?;
        let body: UploadResponse = Self::check(response, "Upload").await?.json().await?;
        Ok(body.id)
    }

    async fn upload_bundle(&self, bundle: &Bundle) -> Result<String, PublishError> {
        let url = format!("{}/bundle", self.base_url);
        debug!("POST {} ({} files)", url, bundle.files.len());

        let response = self
            .authorize(self.client.post(&url))
            .json(bundle)
            .send()
            .await?;
        let body: UploadResponse = Self::check(response, "Bundle upload").await?.json().await?;
        Ok(body.id)
    }
}
