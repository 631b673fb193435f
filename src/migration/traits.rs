//! Seams between the batch pipeline and the stores it talks to.

use super::types::{PassKind, SourceRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Paged access to the table of image references.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Next page of rows selected for `kind`. An empty page means exhausted.
    async fn fetch_page(&self, kind: PassKind, offset: u64, limit: u64)
        -> Result<Vec<SourceRecord>>;

    /// Rewrite the migrated column of `id` to the canonical key. Returns
    /// whether the row is still selected for `kind` afterwards.
    async fn write_back(&self, kind: PassKind, id: &str, canonical_key: &str) -> Result<bool>;
}

/// Read side of the remote object endpoint.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Metadata-only existence check.
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Stream the object body into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Write side of the destination bucket. `put` overwrites.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;
}
