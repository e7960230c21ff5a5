//! Remote object storage.
//!
//! This module provides:
//! - The [`ObjectStore`] seam and its per-run [`StoreConnector`]
//! - [`BlobServiceClient`], an Azure Blob Storage client
//! - [`InMemoryObjectStore`] for tests and dry runs
//! - [`StorageSync`], replace-semantics publishing with retries

mod blob;
mod memory;
mod store;
mod sync;

pub use blob::{BlobConnector, BlobServiceClient, BLOB_API_VERSION};
pub use memory::{InMemoryObjectStore, StoredObject};
#[cfg(test)]
pub use store::MockObjectStore;
pub use store::{ObjectHandle, ObjectStore, StoreConnector};
pub use sync::StorageSync;
