//! Replace-semantics publishing of a single named object.

use std::sync::Arc;
use tracing::{debug, info};

use super::{ObjectHandle, ObjectStore};
use crate::errors::StorageError;
use crate::pipeline::{with_retry, RetryConfig};

/// Publishes objects as delete-if-exists followed by upload.
///
/// Each remote call is retried on transient faults according to the
/// configured policy.
#[derive(Clone)]
pub struct StorageSync {
    store: Arc<dyn ObjectStore>,
    retry: RetryConfig,
}

impl std::fmt::Debug for StorageSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSync")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StorageSync {
    /// Creates a sync over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Replaces `object` in `container` with `content`.
    ///
    /// Fails with [`StorageError::NoHandle`] when the upload went through but
    /// the store returned an empty handle.
    pub async fn replace_object(
        &self,
        container: &str,
        object: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<ObjectHandle, StorageError> {
        let key = format!("{container}/{object}");

        let deleted = with_retry(
            &self.retry,
            &key,
            || self.store.delete_if_exists(container, object),
            StorageError::is_transient,
        )
        .await?;
        if deleted {
            info!(container, object, "Deleted previous {object} from {container}");
        } else {
            debug!(container, object, "No previous {object} in {container}");
        }

        let handle = with_retry(
            &self.retry,
            &key,
            || self.store.upload(container, object, content, content_type),
            StorageError::is_transient,
        )
        .await?;

        match handle {
            Some(handle) if !handle.is_empty() => {
                info!(
                    container,
                    object,
                    handle = %handle,
                    bytes = content.len(),
                    "Uploaded {object}"
                );
                Ok(handle)
            }
            _ => Err(StorageError::NoHandle {
                object: object.to_string(),
            }),
        }
    }
}
