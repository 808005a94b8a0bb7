//! Durable object storage backend
//!
//! Talks to an S3-compatible bucket with path-style addressing
//! (`{endpoint}/{bucket}/{key}`). Every request, including the server's own
//! uploads, downloads and deletes, goes through a presigned URL so there is
//! exactly one signing path. Results are delivered as signed GET URLs that
//! expire after the configured number of minutes.

use super::credentials::CredentialProvider;
use super::signing::{encode_path, presign_query, PresignRequest};
use super::{generate_key, wrong_backend, Delivery, FileKind, StorageGateway, StorageLocation};
use crate::error::{Result, SeparationError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use stemsplit_common::config::ObjectStorageConfig;
use tracing::{debug, info, warn};

/// Lifetime of URLs the server signs for its own requests
const INTERNAL_URL_EXPIRY: Duration = Duration::from_secs(300);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ObjectStorage {
    config: ObjectStorageConfig,
    endpoint: Url,
    host: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl ObjectStorage {
    pub fn new(
        config: ObjectStorageConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            SeparationError::StorageUnavailable(format!(
                "invalid object storage endpoint '{}': {}",
                config.endpoint, e
            ))
        })?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SeparationError::StorageUnavailable(format!(
                    "object storage endpoint '{}' has no host",
                    config.endpoint
                )))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SeparationError::StorageUnavailable(format!("HTTP client: {}", e)))?;

        info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Object storage backend ready"
        );

        Ok(Self {
            config,
            endpoint,
            host,
            client,
            credentials,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn object_path(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            self.config.bucket,
            key
        )
    }

    /// Presigned URL for `method` on `key`, valid for `expires`.
    pub fn presigned_url(&self, method: &Method, key: &str, expires: Duration) -> Result<String> {
        let credentials = self.credentials.credentials()?;
        let path = self.object_path(key);
        let query = presign_query(
            &PresignRequest {
                method: method.as_str(),
                host: &self.host,
                path: &path,
                region: &self.config.region,
                expires,
                timestamp: Utc::now(),
            },
            &credentials,
        )?;

        Ok(format!(
            "{}://{}{}?{}",
            self.endpoint.scheme(),
            self.host,
            encode_path(&path),
            query
        ))
    }

    fn key_for<'a>(&self, location: &'a StorageLocation) -> Result<&'a str> {
        match location {
            StorageLocation::Object { bucket, key } if bucket == &self.config.bucket => {
                Ok(key.as_str())
            }
            StorageLocation::Object { bucket, .. } => Err(SeparationError::NotFound(format!(
                "bucket mismatch: expected {}, got {}",
                self.config.bucket, bucket
            ))),
            other => Err(wrong_backend(other, "object storage")),
        }
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Option<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = self.presigned_url(&method, key, INTERNAL_URL_EXPIRY)?;
        let mut request = self.client.request(method.clone(), &url);
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            SeparationError::StorageUnavailable(format!("{} {}: {}", method, key, e))
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(SeparationError::NotFound(format!(
                "s3://{}/{}",
                self.config.bucket, key
            ))),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(SeparationError::StorageUnavailable(format!(
                    "{} {} returned {}: {}",
                    method,
                    key,
                    status,
                    detail.trim()
                )))
            }
        }
    }
}

#[async_trait]
impl StorageGateway for ObjectStorage {
    fn backend_name(&self) -> &'static str {
        "object"
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        kind: FileKind,
        temporary: bool,
    ) -> Result<StorageLocation> {
        let key = generate_key(&kind, temporary);
        let size = bytes.len();

        self.send(Method::PUT, &key, Some(bytes), Some(kind.content_type()))
            .await
            .map_err(|e| {
                warn!(key = %key, "Upload failed: {}", e);
                e
            })?;

        let location = StorageLocation::Object {
            bucket: self.config.bucket.clone(),
            key,
        };
        info!(bytes = size, "File uploaded successfully: {}", location);
        Ok(location)
    }

    async fn retrieve(&self, location: &StorageLocation) -> Result<Vec<u8>> {
        let key = self.key_for(location)?;
        let response = self.send(Method::GET, key, None, None).await?;
        let bytes = response.bytes().await.map_err(|e| {
            SeparationError::StorageUnavailable(format!("download {}: {}", location, e))
        })?;
        debug!(bytes = bytes.len(), "Downloaded {}", location);
        Ok(bytes.to_vec())
    }

    async fn deliver(&self, location: &StorageLocation, _filename: &str) -> Result<Delivery> {
        let key = self.key_for(location)?;
        let expiry = self.config.signed_url_expiry();
        let url = self.presigned_url(&Method::GET, key, expiry)?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expiry).map_err(|e| {
                SeparationError::StorageUnavailable(format!("signed URL expiry: {}", e))
            })?;

        info!(
            expires_at = %expires_at.to_rfc3339(),
            "Generated signed URL for {}",
            location
        );

        Ok(Delivery::SignedUrl {
            url,
            content_type: location.kind().content_type().to_string(),
            expires_at,
        })
    }

    async fn delete(&self, location: &StorageLocation) -> Result<()> {
        let key = self.key_for(location)?;
        self.send(Method::DELETE, key, None, None).await?;
        info!("File successfully deleted: {}", location);
        Ok(())
    }
}
