//! Object storage for rendered reports

mod local;
mod s3;

use crate::config::StorageBackend;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Object store trait
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name, used in logs
    fn backend(&self) -> &'static str;

    /// Store `bytes` under `key`, replacing any existing object
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Build the configured backend
pub fn from_backend(backend: &StorageBackend) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match backend {
        StorageBackend::Local { root } => Arc::new(LocalObjectStore::new(root.clone())),
        StorageBackend::S3 {
            bucket,
            endpoint,
            region,
            access_key,
            secret_key,
        } => Arc::new(S3ObjectStore::new(
            bucket.clone(),
            endpoint.clone(),
            region.clone(),
            access_key.clone(),
            secret_key.clone(),
        )),
    };

    tracing::info!("Object storage backend: {}", store.backend());
    Ok(store)
}
