use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::Bound;
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{ListPage, ObjectDescriptor, ObjectReader, ObjectStore};

struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory object store keyed in lexicographic order.
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Store that returns at most `page_size` objects per listing page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn put(&self, key: impl Into<String>, data: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());

        let start = match token {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page = ListPage::default();
        for (key, object) in objects.range((start, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if page.objects.len() == self.page_size {
                page.next_token = page.objects.last().map(|o| o.key.clone());
                break;
            }
            page.objects.push(ObjectDescriptor {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
            });
        }

        Ok(page)
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let object = objects
            .get(key)
            .ok_or_else(|| anyhow!("NoSuchKey: {}", key))?;
        Ok(Box::new(Cursor::new(object.data.clone())))
    }
}
