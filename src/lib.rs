//! # prefixzip
//!
//! Serve every object under an object store prefix as a single ZIP archive,
//! assembled while it is being downloaded.
//!
//! A request for `<prefix>.zip` never touches a stored archive. The prefix
//! is listed page by page, each object is fetched in listing order and
//! copied straight into the archive, and the bytes flow through a bounded
//! pipe to whoever delivers the response.
//!
//! ## Features
//!
//! - Metadata requests (Content-Length / Last-Modified) without reading content
//! - Streamed content requests with backpressure between producer and consumer
//! - Directory marker objects become empty folder entries, never fetched
//! - ZIP64 for large objects and archives, STORED or DEFLATE entries
//! - S3, local directory and in-memory object stores
//! - Responses pushed through S3 `WriteGetObjectResponse`, an HTTP endpoint or a local writer
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prefixzip::{ArchiveHandler, Config, S3ObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(S3ObjectStore::from_env("my-bucket".to_string()).await);
//!     let handler = ArchiveHandler::new(store, Arc::new(Config::new("my-bucket")));
//!
//!     let ctx = handler.new_context();
//!     let head = handler.head("https://example.com/orders/2024.zip", &ctx).await;
//!     println!("{:?}", head.headers);
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod estimate;
pub mod handler;
pub mod listing;
pub mod resolver;
pub mod sink;
pub mod store;
pub mod types;
pub mod zip;

pub use archive::{ArchiveStreamWriter, ArchiveSummary, WriterState};
pub use cli::Cli;
pub use config::Config;
pub use context::RequestContext;
pub use error::ArchiveError;
pub use handler::ArchiveHandler;
pub use sink::{HttpResponseSink, OutputRoute, ResponseSink, S3ResponseSink, WriterSink};
pub use store::{LocalObjectStore, MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use zip::ZipStreamWriter;
