//! The object-store seam used by the publish stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::StorageSettings;
use crate::errors::StorageError;

/// Opaque reference to an uploaded object (an ETag for blob storage).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(String);

impl ObjectHandle {
    /// Wraps a handle string.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the handle carries no reference.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remote store of named objects grouped into containers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Deletes `object` if it exists. Returns whether something was deleted.
    async fn delete_if_exists(&self, container: &str, object: &str) -> Result<bool, StorageError>;

    /// Uploads `content` as `object`, overwriting any existing object.
    ///
    /// Returns the new object's handle, or `None` if the store returned none.
    async fn upload(
        &self,
        container: &str,
        object: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<Option<ObjectHandle>, StorageError>;
}

/// Creates the store client for one run.
pub trait StoreConnector: Send + Sync {
    /// Builds a client from validated settings.
    fn connect(&self, settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StorageError>;
}
