//! Paginated listing of a prefix.
//!
//! [`Paginator`] walks the store's listing page by page so callers never hold
//! more than one page. [`aggregate`] folds a whole listing into
//! [`AggregateMetadata`] for metadata requests.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::archive::ArchiveEntry;
use crate::context::RequestContext;
use crate::error::{ArchiveError, Result};
use crate::store::{ObjectDescriptor, ObjectStore};

/// Walks the pages of a prefix listing in store order.
pub struct Paginator<'a> {
    store: &'a dyn ObjectStore,
    prefix: &'a str,
    token: Option<String>,
    done: bool,
    pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: &'a str) -> Self {
        Self {
            store,
            prefix,
            token: None,
            done: false,
            pages: 0,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        !self.done
    }

    /// Number of pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetch the next page.
    ///
    /// The request is abandoned as soon as `ctx` ends. Once a page fails the
    /// paginator is finished and everything gathered so far is invalid.
    pub async fn next_page(&mut self, ctx: &RequestContext) -> Result<Vec<ObjectDescriptor>> {
        if self.done {
            return Ok(Vec::new());
        }
        ctx.check()?;

        let listed = ctx
            .run_until_cancelled(self.store.list_page(self.prefix, self.token.as_deref()))
            .await
            .and_then(|res| res.map_err(ArchiveError::Pagination));
        let page = match listed {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Err(err);
            }
        };
        self.pages += 1;

        debug!(
            prefix = self.prefix,
            page = self.pages,
            objects = page.objects.len(),
            "fetched listing page"
        );

        match page.next_token {
            Some(next) if self.token.as_deref() == Some(next.as_str()) => {
                warn!(prefix = self.prefix, token = %next, "store repeated a continuation token");
                self.done = true;
                return Err(ArchiveError::Pagination(anyhow!(
                    "continuation token {next} repeated after page {}",
                    self.pages
                )));
            }
            Some(next) => self.token = Some(next),
            None => self.done = true,
        }

        Ok(page.objects)
    }
}

/// Totals over every object under a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateMetadata {
    pub total_size: u64,
    /// `None` when nothing matched.
    pub most_recent_modification: Option<DateTime<Utc>>,
    /// Number of entries the archive of the prefix holds.
    pub entry_count: u64,
}

impl AggregateMetadata {
    /// Fold in an object that becomes an archive entry.
    pub fn record(&mut self, object: &ObjectDescriptor) {
        self.entry_count += 1;
        self.touch(object);
    }

    /// Fold in an object's size and time without counting an entry.
    pub fn touch(&mut self, object: &ObjectDescriptor) {
        self.total_size = self.total_size.saturating_add(object.size);
        if self
            .most_recent_modification
            .is_none_or(|t| object.last_modified > t)
        {
            self.most_recent_modification = Some(object.last_modified);
        }
    }
}

/// Page through `prefix` and fold every object into an aggregate.
pub async fn aggregate(
    store: &dyn ObjectStore,
    prefix: &str,
    ctx: &RequestContext,
) -> Result<AggregateMetadata> {
    let mut paginator = Paginator::new(store, prefix);
    let mut metadata = AggregateMetadata::default();

    while paginator.has_more_pages() {
        for object in paginator.next_page(ctx).await? {
            if ArchiveEntry::for_key(prefix, &object.key).is_some() {
                metadata.record(&object);
            } else {
                metadata.touch(&object);
            }
        }
    }

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ListPage, MemoryObjectStore, ObjectReader};
    use std::time::Duration;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ts(month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_sums_sizes_and_latest_time() {
        let store = MemoryObjectStore::with_page_size(1);
        store.put("orders/2024/a.txt", "hello", ts(1));
        store.put("orders/2024/sub/", "", ts(3));
        store.put("orders/2024/b.txt", "hi!", ts(2));

        let metadata = aggregate(&store, "orders/2024", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(metadata.total_size, 8);
        assert_eq!(metadata.entry_count, 3);
        assert_eq!(metadata.most_recent_modification, Some(ts(3)));
    }

    #[tokio::test]
    async fn test_aggregate_of_nothing_is_empty() {
        let store = MemoryObjectStore::new();
        let metadata = aggregate(&store, "missing", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(metadata, AggregateMetadata::default());
    }

    struct FailOnSecondPage {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for FailOnSecondPage {
        async fn list_page(&self, prefix: &str, _token: Option<&str>) -> anyhow::Result<ListPage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(ListPage {
                    objects: vec![ObjectDescriptor {
                        key: format!("{prefix}/a"),
                        size: 1,
                        last_modified: ts(1),
                    }],
                    next_token: Some("t1".to_string()),
                })
            } else {
                Err(anyhow!("throttled"))
            }
        }

        async fn open(&self, _key: &str) -> anyhow::Result<ObjectReader> {
            unreachable!("listing only")
        }
    }

    #[tokio::test]
    async fn test_page_failure_aborts_with_pagination_error() {
        let store = FailOnSecondPage {
            calls: AtomicUsize::new(0),
        };
        let err = aggregate(&store, "p", &RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Pagination(_)));
        assert!(err.to_string().contains("throttled"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_listing() {
        let store = FailOnSecondPage {
            calls: AtomicUsize::new(0),
        };
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = aggregate(&store, "p", &ctx).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    struct RepeatingToken;

    #[async_trait]
    impl ObjectStore for RepeatingToken {
        async fn list_page(&self, _prefix: &str, _token: Option<&str>) -> anyhow::Result<ListPage> {
            Ok(ListPage {
                objects: Vec::new(),
                next_token: Some("same".to_string()),
            })
        }

        async fn open(&self, _key: &str) -> anyhow::Result<ObjectReader> {
            unreachable!("listing only")
        }
    }

    #[tokio::test]
    async fn test_repeated_token_fails_listing() {
        let mut paginator = Paginator::new(&RepeatingToken, "p");
        let ctx = RequestContext::new();
        paginator.next_page(&ctx).await.unwrap();
        let err = paginator.next_page(&ctx).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Pagination(_)));
        assert!(err.to_string().contains("repeated"));
        assert!(!paginator.has_more_pages());
        assert_eq!(paginator.pages(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_counts_only_archive_entries() {
        let store = MemoryObjectStore::new();
        store.put("orders/2024/", "", ts(4));
        store.put("orders/2024/a.txt", "hello", ts(1));
        store.put("orders/2024/sub/", "", ts(2));

        let metadata = aggregate(&store, "orders/2024", &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(metadata.entry_count, 2);
        assert_eq!(metadata.total_size, 5);
        // the folder marker still dates the archive
        assert_eq!(metadata.most_recent_modification, Some(ts(4)));
    }

    struct StalledListing;

    #[async_trait]
    impl ObjectStore for StalledListing {
        async fn list_page(&self, _prefix: &str, _token: Option<&str>) -> anyhow::Result<ListPage> {
            std::future::pending().await
        }

        async fn open(&self, _key: &str) -> anyhow::Result<ObjectReader> {
            unreachable!("listing only")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_stalled_listing() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let err = tokio::time::timeout(
            Duration::from_secs(3600),
            aggregate(&StalledListing, "p", &ctx),
        )
        .await
        .expect("listing outlived its deadline")
        .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Cancelled {
                reason: "deadline exceeded"
            }
        ));
    }
}
