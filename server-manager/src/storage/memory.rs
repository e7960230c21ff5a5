//! In-process object store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{ObjectHandle, ObjectStore, StoreConnector};
use crate::config::StorageSettings;
use crate::errors::StorageError;

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object bytes.
    pub content: Vec<u8>,
    /// Content type given at upload.
    pub content_type: String,
    /// Handle returned for the upload.
    pub handle: ObjectHandle,
}

/// An [`ObjectStore`] held in memory, with call counting and fault injection.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    next_etag: AtomicU64,
    delete_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    pending_upload_faults: Mutex<Vec<bool>>,
    empty_handles: Mutex<bool>,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object stored under `container`/`object`.
    #[must_use]
    pub fn get(&self, container: &str, object: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .get(&(container.to_string(), object.to_string()))
            .cloned()
    }

    /// Names of the objects in `container`.
    #[must_use]
    pub fn list(&self, container: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// Total number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Number of delete calls received.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of upload calls received.
    #[must_use]
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Makes the next upload fail; queued faults are consumed in order.
    pub fn fail_next_upload(&self, transient: bool) {
        self.pending_upload_faults.lock().push(transient);
    }

    /// Makes uploads succeed without returning a handle.
    pub fn return_empty_handles(&self, enabled: bool) {
        *self.empty_handles.lock() = enabled;
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn delete_if_exists(&self, container: &str, object: &str) -> Result<bool, StorageError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .lock()
            .remove(&(container.to_string(), object.to_string()))
            .is_some())
    }

    async fn upload(
        &self,
        container: &str,
        object: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<Option<ObjectHandle>, StorageError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        let fault = {
            let mut faults = self.pending_upload_faults.lock();
            (!faults.is_empty()).then(|| faults.remove(0))
        };
        if let Some(transient) = fault {
            return Err(StorageError::transport("upload", "injected fault", transient));
        }

        let etag = self.next_etag.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = ObjectHandle::new(format!("\"0x{etag:X}\""));
        self.objects.lock().insert(
            (container.to_string(), object.to_string()),
            StoredObject {
                content: content.to_vec(),
                content_type: content_type.to_string(),
                handle: handle.clone(),
            },
        );

        if *self.empty_handles.lock() {
            return Ok(None);
        }
        Ok(Some(handle))
    }
}

impl StoreConnector for Arc<InMemoryObjectStore> {
    fn connect(&self, _settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_get() {
        let store = InMemoryObjectStore::new();

        let handle = store
            .upload("map", "map.jpg", b"jpeg", "image/jpeg")
            .await
            .unwrap()
            .unwrap();

        let stored = store.get("map", "map.jpg").unwrap();
        assert_eq!(stored.content, b"jpeg");
        assert_eq!(stored.handle, handle);
        assert_eq!(store.list("map"), vec!["map.jpg".to_string()]);
        assert!(store.list("mods").is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = InMemoryObjectStore::new();
        assert!(!store.delete_if_exists("map", "map.jpg").await.unwrap());

        store.upload("map", "map.jpg", b"x", "image/jpeg").await.unwrap();
        assert!(store.delete_if_exists("map", "map.jpg").await.unwrap());
        assert!(store.is_empty());
        assert_eq!(store.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let store = InMemoryObjectStore::new();
        store.fail_next_upload(true);
        store.fail_next_upload(false);

        let first = store.upload("map", "a", b"1", "text/plain").await.unwrap_err();
        let second = store.upload("map", "a", b"1", "text/plain").await.unwrap_err();
        let third = store.upload("map", "a", b"1", "text/plain").await;

        assert!(first.is_transient());
        assert!(!second.is_transient());
        assert!(third.is_ok());
        assert_eq!(store.upload_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_handles() {
        let store = InMemoryObjectStore::new();
        store.return_empty_handles(true);

        let handle = store.upload("map", "a", b"1", "text/plain").await.unwrap();
        assert!(handle.is_none());
        assert_eq!(store.len(), 1);
    }
}
