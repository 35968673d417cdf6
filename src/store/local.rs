use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::warn;

use super::{ListPage, ObjectDescriptor, ObjectReader, ObjectStore};

const PAGE_SIZE: usize = 1000;

/// Directory tree served as a bucket.
///
/// Keys are `/`-joined paths relative to the root. Empty directories are
/// reported as zero-byte directory markers (`dir/`).
pub struct LocalObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalObjectStore {
    pub fn new(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("Bucket directory does not exist: {}", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
            page_size: PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Collect every key under `prefix`, unsorted.
    async fn collect_keys(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>> {
        let mut found = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, dir_key)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("reading {}", dir.display()))?;
            let mut empty = true;

            while let Some(entry) = entries.next_entry().await? {
                empty = false;
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                    continue;
                };
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    let child_key = format!("{}{}/", dir_key, name);
                    // Only descend where the subtree can still match the prefix
                    if child_key.starts_with(prefix) || prefix.starts_with(&child_key) {
                        pending.push((entry.path(), child_key));
                    }
                } else {
                    let key = format!("{}{}", dir_key, name);
                    if key.starts_with(prefix) {
                        found.push(ObjectDescriptor {
                            key,
                            size: metadata.len(),
                            last_modified: DateTime::<Utc>::from(metadata.modified()?),
                        });
                    }
                }
            }

            if empty && !dir_key.is_empty() && dir_key.starts_with(prefix) {
                let metadata = fs::metadata(&dir).await?;
                found.push(ObjectDescriptor {
                    key: dir_key,
                    size: 0,
                    last_modified: DateTime::<Utc>::from(metadata.modified()?),
                });
            }
        }

        Ok(found)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object key: {}", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        let mut objects = self.collect_keys(prefix).await?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(after) = token {
            objects.retain(|o| o.key.as_str() > after);
        }

        let next_token = if objects.len() > self.page_size {
            objects.truncate(self.page_size);
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        let path = self.resolve(key)?;
        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Box::new(file))
    }
}
