mod http;
mod s3;
mod writer;

pub use http::HttpResponseSink;
pub use s3::S3ResponseSink;
pub use writer::WriterSink;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::bridge::PipeReader;
use crate::error::ArchiveError;

/// Routing identifiers that tie a pushed response to its original request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoute {
    pub route: String,
    pub token: String,
}

/// Error pushed instead of a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub error_code: String,
    pub error_message: String,
}

impl From<&ArchiveError> for ErrorResponse {
    fn from(err: &ArchiveError) -> Self {
        Self {
            status_code: err.status_code(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        }
    }
}

/// Delivery channel for content responses.
///
/// A request gets either one error or one body, never both.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn write_error(&self, route: &OutputRoute, error: &ErrorResponse) -> Result<()>;

    /// Deliver a streamed body with status 200. Returns once the body is
    /// fully consumed or delivery fails.
    async fn write_body(&self, route: &OutputRoute, body: PipeReader) -> Result<()>;
}
