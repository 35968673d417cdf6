mod local;
mod memory;
mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a prefix listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectDescriptor>,
    /// Token for the next page, `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

/// Readable object content.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Key-addressed object storage that can list by prefix and read objects.
///
/// One instance is shared by every request the process serves.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the listing page after `token` (the first page when `None`).
    ///
    /// Objects are returned in ascending key order.
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage>;

    /// Open the content of `key` for streaming.
    async fn open(&self, key: &str) -> Result<ObjectReader>;
}
