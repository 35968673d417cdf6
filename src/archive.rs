//! Assembles the ZIP archive of a prefix while paging through its listing.
//!
//! One object is opened and copied at a time, in listing order, so memory
//! use is bounded by the copy buffer plus the central directory records.

use std::fmt;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::error::{ArchiveError, Result};
use crate::listing::Paginator;
use crate::store::{ObjectDescriptor, ObjectStore};
use crate::zip::{CompressionMethod, ZipStreamWriter};

/// Size of the buffer object content is copied through.
const COPY_BUFFER: usize = 64 * 1024;

/// Progress of an [`ArchiveStreamWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Paginating,
    WritingHeader,
    StreamingBody,
    WritingTrailer,
    Closed,
    Failed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How one listed object appears in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry<'a> {
    pub name: &'a str,
    pub is_directory_marker: bool,
}

impl<'a> ArchiveEntry<'a> {
    /// Entry for `key` listed under `prefix`.
    ///
    /// The name is the key without `prefix/`; keys outside that folder keep
    /// their full key. Returns `None` for the folder's own marker object.
    pub fn for_key(prefix: &str, key: &'a str) -> Option<Self> {
        let name = key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(key);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            is_directory_marker: name.ends_with('/'),
        })
    }
}

/// Totals for a finished archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: u64,
    pub directories: u64,
    /// Uncompressed content bytes copied from the store
    pub content_bytes: u64,
    /// Total archive bytes emitted
    pub archive_bytes: u64,
}

/// Streams the archive of one prefix into `W`.
pub struct ArchiveStreamWriter<'a, W> {
    store: &'a dyn ObjectStore,
    prefix: &'a str,
    zip: Option<ZipStreamWriter<W>>,
    state: WriterState,
    summary: ArchiveSummary,
    buf: Vec<u8>,
}

impl<'a, W: AsyncWrite + Unpin> ArchiveStreamWriter<'a, W> {
    pub fn new(
        store: &'a dyn ObjectStore,
        prefix: &'a str,
        out: W,
        method: CompressionMethod,
    ) -> Self {
        Self {
            store,
            prefix,
            zip: Some(ZipStreamWriter::new(out, method)),
            state: WriterState::Idle,
            summary: ArchiveSummary::default(),
            buf: vec![0u8; COPY_BUFFER],
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Write the whole archive.
    ///
    /// Any error leaves the writer in [`WriterState::Failed`]; bytes already
    /// written stay written. A store call or write still pending when `ctx`
    /// ends is dropped and the run fails with [`ArchiveError::Cancelled`].
    pub async fn run(&mut self, ctx: &RequestContext) -> Result<ArchiveSummary> {
        if self.state != WriterState::Idle {
            return Err(ArchiveError::UnexpectedFault(format!(
                "archive writer started in state {}",
                self.state
            )));
        }

        let outcome = ctx
            .run_until_cancelled(self.write_all_entries(ctx))
            .await
            .and_then(|res| res);
        match outcome {
            Ok(()) => {
                self.state = WriterState::Closed;
                info!(
                    prefix = self.prefix,
                    files = self.summary.files,
                    directories = self.summary.directories,
                    bytes = self.summary.archive_bytes,
                    "archive complete"
                );
                Ok(self.summary.clone())
            }
            Err(err) => {
                debug!(prefix = self.prefix, state = %self.state, "archive writer failed");
                self.state = WriterState::Failed;
                Err(err)
            }
        }
    }

    async fn write_all_entries(&mut self, ctx: &RequestContext) -> Result<()> {
        self.state = WriterState::Paginating;
        let mut paginator = Paginator::new(self.store, self.prefix);

        while paginator.has_more_pages() {
            for object in paginator.next_page(ctx).await? {
                ctx.check()?;
                self.write_entry(&object).await?;
                self.state = WriterState::Paginating;
            }
        }

        self.state = WriterState::WritingTrailer;
        let zip = self.zip.take().ok_or_else(|| {
            ArchiveError::UnexpectedFault("archive trailer already written".to_string())
        })?;
        let (mut out, archive_bytes) = zip.finish().await?;
        self.summary.archive_bytes = archive_bytes;
        out.shutdown().await?;
        Ok(())
    }

    async fn write_entry(&mut self, object: &ObjectDescriptor) -> Result<()> {
        let Some(entry) = ArchiveEntry::for_key(self.prefix, &object.key) else {
            debug!(key = %object.key, "skipping folder marker of the prefix itself");
            return Ok(());
        };
        let zip = self.zip.as_mut().ok_or_else(|| {
            ArchiveError::UnexpectedFault("entry written after trailer".to_string())
        })?;

        self.state = WriterState::WritingHeader;
        debug!(key = %object.key, name = entry.name, size = object.size, "adding entry");
        if entry.is_directory_marker {
            // Folder placeholders carry no content, never fetch them
            zip.add_directory(entry.name, &object.last_modified).await?;
            self.summary.directories += 1;
            return Ok(());
        }
        zip.start_file(entry.name, &object.last_modified, object.size)
            .await?;

        self.state = WriterState::StreamingBody;
        let copied = copy_body(self.store, zip, &mut self.buf, &object.key).await?;
        if copied != object.size {
            debug!(
                key = %object.key,
                listed = object.size,
                copied,
                "object size differs from listing"
            );
        }

        self.summary.files += 1;
        self.summary.content_bytes += copied;
        Ok(())
    }
}

/// Fetch `key` and copy it into the open entry, then close the entry.
async fn copy_body<W: AsyncWrite + Unpin>(
    store: &dyn ObjectStore,
    zip: &mut ZipStreamWriter<W>,
    buf: &mut [u8],
    key: &str,
) -> Result<u64> {
    let fetch_error = |source: anyhow::Error| ArchiveError::Fetch {
        key: key.to_string(),
        source,
    };

    let mut body = store.open(key).await.map_err(fetch_error)?;
    loop {
        let n = body
            .read(buf)
            .await
            .map_err(|e| fetch_error(anyhow::Error::new(e).context("copying object body")))?;
        if n == 0 {
            break;
        }
        zip.write_data(&buf[..n]).await?;
    }
    Ok(zip.finish_file().await?)
}

/// Write the archive of `prefix` to `out`, returning what was written.
pub async fn write_archive<W: AsyncWrite + Unpin>(
    store: &dyn ObjectStore,
    prefix: &str,
    out: W,
    method: CompressionMethod,
    ctx: &RequestContext,
) -> Result<ArchiveSummary> {
    ArchiveStreamWriter::new(store, prefix, out, method)
        .run(ctx)
        .await
}
