// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::error::{ConfigError, ObjectStoreError};

use super::{ObjectInfo, ObjectStore};

/// Access key pair sent as basic credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

/// Object store speaking plain HTTP against a path-style bucket endpoint
///
/// Objects live at `<endpoint>/<bucket>/<key>`; that URL is also the
/// location recorded for uploaded episodes.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    credentials: Option<Credentials>,
    bucket_ready: Arc<OnceCell<()>>,
}

impl HttpObjectStore {
    /// Create a store with default reqwest settings
    pub fn new(endpoint: Url, bucket: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_client(reqwest::Client::new(), endpoint, bucket)
    }

    /// Create a store with a custom reqwest::Client
    pub fn with_client(
        client: reqwest::Client,
        endpoint: Url,
        bucket: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if endpoint.cannot_be_a_base() {
            return Err(ConfigError::InvalidEndpoint {
                url: endpoint.to_string(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
            credentials: None,
            bucket_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Attach credentials to every request
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn bucket_url(&self) -> Url {
        self.url_for(&[])
    }

    /// Public URL of an object
    pub fn object_url(&self, key: &str) -> Url {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        self.url_for(&segments)
    }

    fn url_for(&self, key_segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // cannot-be-a-base endpoints are rejected at construction
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.bucket)
                .extend(key_segments);
        }
        url
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let builder = self.client.request(method, url.clone());
        match &self.credentials {
            Some(credentials) => builder.basic_auth(&credentials.key, Some(&credentials.secret)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, url: &Url) -> Result<Response, ObjectStoreError> {
        builder
            .send()
            .await
            .map_err(|e| ObjectStoreError::HttpFailed {
                url: url.to_string(),
                source: e,
            })
    }

    /// Create the bucket once per client; an existing bucket is fine
    async fn ensure_bucket(&self) -> Result<(), ObjectStoreError> {
        self.bucket_ready
            .get_or_try_init(|| async {
                let url = self.bucket_url();
                let response = self.send(self.request(Method::PUT, &url), &url).await?;
                let status = response.status();

                if status.is_success() || status == StatusCode::CONFLICT {
                    debug!(bucket = %self.bucket, status = status.as_u16(), "bucket ready");
                    Ok(())
                } else {
                    Err(ObjectStoreError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    })
                }
            })
            .await?;

        Ok(())
    }
}

fn check_status(response: &Response, url: &Url) -> Result<(), ObjectStoreError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(ObjectStoreError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.ensure_bucket().await?;

        let local_error = |e| ObjectStoreError::LocalFileFailed {
            path: local_path.to_path_buf(),
            source: e,
        };
        let file = tokio::fs::File::open(local_path).await.map_err(local_error)?;
        let length = file.metadata().await.map_err(local_error)?.len();

        let url = self.object_url(key);
        let request = self
            .request(Method::PUT, &url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(reqwest::Body::from(file));

        let response = self.send(request, &url).await?;
        check_status(&response, &url)?;

        info!(key, bytes = length, "object uploaded");
        Ok(url.to_string())
    }

    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        let url = self.object_url(key);
        let response = self.send(self.request(Method::DELETE, &url), &url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(&response, &url)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError> {
        let url = self.object_url(key);
        let response = self.send(self.request(Method::HEAD, &url), &url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(&response, &url)?;

        // HEAD responses carry no body, so read the header rather than the body size hint
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);

        Ok(Some(ObjectInfo {
            size,
            location: url.to_string(),
        }))
    }
}
