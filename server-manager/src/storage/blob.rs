//! Azure Blob Storage over its REST API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use reqwest::header::{CONTENT_TYPE, ETAG};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use tracing::debug;

use super::{ObjectHandle, ObjectStore, StoreConnector};
use crate::config::StorageSettings;
use crate::errors::StorageError;

/// REST API version sent with every request.
pub const BLOB_API_VERSION: &str = "2021-08-06";

/// Client for one blob service endpoint.
///
/// Authentication is carried by the optional SAS query string.
#[derive(Clone)]
pub struct BlobServiceClient {
    http: reqwest::Client,
    endpoint: Url,
    sas: Option<String>,
}

impl std::fmt::Debug for BlobServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobServiceClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("sas", &self.sas.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl BlobServiceClient {
    /// Creates a client for the endpoint in `settings`.
    pub fn new(settings: &StorageSettings) -> Result<Self, StorageError> {
        let endpoint = Url::parse(&settings.account_uri).map_err(|e| StorageError::InvalidLocator {
            locator: settings.account_uri.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(StorageError::InvalidLocator {
                locator: settings.account_uri.clone(),
                reason: "expected an http(s) endpoint".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("server-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::transport("connect", e.to_string(), false))?;

        Ok(Self {
            http,
            endpoint,
            sas: settings
                .sas_token
                .as_deref()
                .map(|s| s.trim_start_matches('?').to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    /// URL of `object` inside `container`, with the SAS query applied.
    pub fn object_url(&self, container: &str, object: &str) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidLocator {
                locator: self.endpoint.to_string(),
                reason: "endpoint cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .push(container)
            .push(object);
        if let Some(sas) = &self.sas {
            url.set_query(Some(sas));
        }
        Ok(url)
    }
}

fn transport_error(operation: &'static str, err: &reqwest::Error) -> StorageError {
    let transient = err.is_timeout() || err.is_connect();
    StorageError::transport(operation, err.to_string(), transient)
}

#[async_trait]
impl ObjectStore for BlobServiceClient {
    async fn delete_if_exists(&self, container: &str, object: &str) -> Result<bool, StorageError> {
        let url = self.object_url(container, object)?;
        let response = self
            .http
            .delete(url)
            .header("x-ms-version", BLOB_API_VERSION)
            .header("x-ms-delete-snapshots", "include")
            .send()
            .await
            .map_err(|e| transport_error("delete", &e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StorageError::Status {
                operation: "delete",
                status: status.as_u16(),
            }),
        }
    }

    async fn upload(
        &self,
        container: &str,
        object: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<Option<ObjectHandle>, StorageError> {
        let url = self.object_url(container, object)?;
        let digest = BASE64.encode(Md5::digest(content));
        debug!(container, object, bytes = content.len(), md5 = %digest, "Uploading blob");

        let response = self
            .http
            .put(url)
            .header("x-ms-version", BLOB_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, content_type)
            .header("Content-MD5", digest)
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| transport_error("upload", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                operation: "upload",
                status: status.as_u16(),
            });
        }

        Ok(response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ObjectHandle::new)
            .filter(|h| !h.is_empty()))
    }
}

/// Connects [`BlobServiceClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobConnector;

impl StoreConnector for BlobConnector {
    fn connect(&self, settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(Arc::new(BlobServiceClient::new(settings)?))
    }
}
